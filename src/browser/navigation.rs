use crate::core::BrowserTrait;
use crate::errors::{Result, ScrapeError};
use crate::utils::javascript::{JavaScriptRunner, NETWORK_PROBE};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct NavigationManager;

impl NavigationManager {
    /// Waits until every reachable document has finished loading and no
    /// fetch/XHR request has been in flight for `idle`.
    ///
    /// Probe failures are expected while a navigation replaces the document
    /// and only mean "not quiet yet".
    pub async fn wait_for_network_idle<B: BrowserTrait>(
        browser: &B,
        tab: &B::TabHandle,
        idle: Duration,
        timeout: Duration,
    ) -> Result<NavigationResult> {
        let start_time = Instant::now();

        while start_time.elapsed() < timeout {
            match JavaScriptRunner::call(browser, tab, NETWORK_PROBE, &[]).await {
                Ok(result) => {
                    let complete = result
                        .get("complete")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let pending = result.get("pending").and_then(|v| v.as_u64()).unwrap_or(0);
                    let quiet_ms = result.get("quietMs").and_then(|v| v.as_u64()).unwrap_or(0);

                    if complete && pending == 0 && quiet_ms >= idle.as_millis() as u64 {
                        return Ok(NavigationResult {
                            url: result
                                .get("url")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string(),
                            duration_ms: start_time.elapsed().as_millis() as u64,
                        });
                    }
                }
                Err(e) => {
                    debug!(error = %e, "network probe failed, retrying");
                }
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Err(ScrapeError::TimeoutError(format!(
            "network not idle after {}ms",
            timeout.as_millis()
        )))
    }
}

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub duration_ms: u64,
}
