pub mod driver;
pub mod pagination;
pub mod store;

pub use driver::{SkippedStep, SweepDriver, SweepOutcome};
pub use pagination::{PageWalk, PaginationWalker};
pub use store::RecordStore;
