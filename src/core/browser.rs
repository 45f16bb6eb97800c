use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type TabHandle: Send + Sync;

    /// Launch a new browser instance
    async fn launch(&mut self, config: &crate::core::config::BrowserConfig) -> Result<()>;

    /// Create a new tab/page
    async fn new_tab(&self) -> Result<Self::TabHandle>;

    /// Navigate to a URL and wait for the navigation to commit
    async fn navigate(&self, tab: &Self::TabHandle, url: &str, timeout_ms: u64) -> Result<()>;

    /// Execute JavaScript in the top document. The future must not block
    /// the runtime, so callers can bound it with a timeout.
    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value>;

    async fn get_url(&self, tab: &Self::TabHandle) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}
