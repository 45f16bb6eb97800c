pub mod javascript;
pub mod wait;

pub use javascript::JavaScriptRunner;
pub use wait::{blocking, poll_until, settle};
