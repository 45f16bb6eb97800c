pub mod table;

pub use table::{header_score, parse_records, TableLocator};
