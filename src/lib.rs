pub mod browser;
pub mod core;
pub mod dom;
pub mod errors;
pub mod export;
pub mod form;
pub mod sweep;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod utils;

#[cfg(feature = "chrome")]
pub use browser::ChromeBrowser;
pub use browser::ScriptedFormHost;
pub use crate::core::{BrowserTrait, Config, FormHost, SeedConfig, TimingConfig};
pub use errors::{Result, ScrapeError};
pub use export::{CsvSink, RecordSink};
pub use form::{ControlClassifier, ControlFingerprint};
pub use sweep::{SkippedStep, SweepDriver, SweepOutcome};
pub use types::*;
