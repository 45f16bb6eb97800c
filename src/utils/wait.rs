use crate::errors::{Result, ScrapeError};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Polls `probe` every `interval` until it reports `true` or `timeout`
/// elapses. The probe always runs at least once. Probe errors propagate;
/// callers that want to tolerate them map errors to `Ok(false)`.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut probe: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let start = Instant::now();

    loop {
        if probe().await? {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Runs a synchronous browser call on the blocking pool. The returned future
/// can be dropped (for instance by `tokio::time::timeout`) while the call is
/// still in flight.
pub async fn blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ScrapeError::AnyhowError(format!("blocking browser call failed: {}", e)))?
}

/// Sleeps unless the duration is zero.
pub async fn settle(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_poll_until_succeeds_after_a_few_probes() {
        let calls = AtomicUsize::new(0);
        let ok = poll_until(Duration::from_secs(1), Duration::from_millis(1), || async {
            Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();

        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let ok = poll_until(Duration::from_millis(20), Duration::from_millis(5), || async {
            Ok(false)
        })
        .await
        .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_poll_until_propagates_errors() {
        let result = poll_until(Duration::from_millis(20), Duration::from_millis(5), || async {
            Err(ScrapeError::StaleNode("gone".into()))
        })
        .await;
        assert!(matches!(result, Err(ScrapeError::StaleNode(_))));
    }
}
