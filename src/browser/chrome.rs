use crate::core::config::BrowserConfig;
use crate::core::BrowserTrait;
use crate::errors::{Result, ScrapeError};
use crate::utils::blocking;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Chrome browser implementation
pub struct ChromeBrowser {
    browser: Option<Browser>,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self { browser: None }
    }
}

impl Default for ChromeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type TabHandle = Arc<Tab>;

    async fn launch(&mut self, config: &BrowserConfig) -> Result<()> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );

        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let locale_arg = config.locale.as_ref().map(|l| format!("--lang={}", l));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        if let Some(ref locale) = locale_arg {
            args.push(OsStr::new(locale));
        }

        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .build()
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;

        info!(headless = config.headless, "chrome launched");
        self.browser = Some(browser);
        Ok(())
    }

    async fn new_tab(&self) -> Result<Self::TabHandle> {
        let browser = self
            .browser
            .as_ref()
            .ok_or(ScrapeError::BrowserNotLaunched)?;

        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::TabCreationFailed(e.to_string()))?;

        Ok(tab)
    }

    async fn navigate(&self, tab: &Self::TabHandle, url: &str, timeout_ms: u64) -> Result<()> {
        debug!(url, "navigating");
        let tab = Arc::clone(tab);
        let url = url.to_string();

        blocking(move || {
            tab.set_default_timeout(Duration::from_millis(timeout_ms));

            tab.navigate_to(&url)
                .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;

            tab.wait_until_navigated()
                .map_err(|e| ScrapeError::NavigationFailed(e.to_string()))?;

            Ok(())
        })
        .await
    }

    // CDP calls block the calling thread, so they run on the blocking pool to
    // keep script timeouts enforceable.
    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value> {
        let tab = Arc::clone(tab);
        let script = script.to_string();

        blocking(move || {
            let result = tab
                .evaluate(&script, false)
                .map_err(|e| ScrapeError::JavaScriptFailed(e.to_string()))?;

            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn get_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(tab.get_url())
    }

    async fn close(&mut self) -> Result<()> {
        self.browser = None;
        Ok(())
    }
}
