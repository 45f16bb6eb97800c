#[cfg(feature = "chrome")]
pub mod chrome;
pub mod host;
pub mod navigation;

#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;
pub use host::ScriptedFormHost;
pub use navigation::{NavigationManager, NavigationResult};
