pub mod browser;
pub mod config;
pub mod host;

pub use browser::BrowserTrait;
pub use config::{BrowserConfig, Config, OutputConfig, RoleLabels, SeedConfig, TimingConfig};
pub use host::FormHost;
