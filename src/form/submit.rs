use crate::core::FormHost;
use crate::errors::{Result, ScrapeError};
use crate::form::context::ContextLocator;
use crate::types::{AriaRole, ContextId, ElementState, NodeHandle, Scope};
use std::time::Duration;
use tracing::{debug, info};

pub const CLICKABLE_CSS: &str = "input[type=\"button\"], input[type=\"submit\"], button, a";

const VISIBLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Finds and fires the search control.
pub struct SearchTrigger<'a> {
    labels: &'a [String],
}

impl<'a> SearchTrigger<'a> {
    pub fn new(labels: &'a [String]) -> Self {
        Self { labels }
    }

    /// Button-role controls named like a search label win; input buttons
    /// whose `value` matches a label are the fallback.
    pub async fn locate(&self, host: &dyn FormHost, context: &ContextId) -> Result<NodeHandle> {
        for label in self.labels {
            if let Ok(hits) = host.query_by_role(context, AriaRole::Button, label).await {
                if let Some(hit) = hits.into_iter().next() {
                    debug!(label = %label, node = %hit, "search control found by role");
                    return Ok(hit);
                }
            }
        }

        for candidate in host.query_all(Scope::Context(context), CLICKABLE_CSS).await? {
            let value = host.attribute(&candidate, "value").await?.unwrap_or_default();
            let value = value.trim();
            if !value.is_empty() && self.labels.iter().any(|l| l.trim() == value) {
                debug!(value, node = %candidate, "search control found by value");
                return Ok(candidate);
            }
        }

        Err(ScrapeError::SubmitControlNotFound(format!(
            "no control labelled {:?} in {}",
            self.labels, context
        )))
    }

    pub async fn fire(&self, host: &dyn FormHost) -> Result<()> {
        let context = ContextLocator::locate(host).await;
        let control = self.locate(host, &context).await?;
        if let Err(e) = host
            .wait_for_state(&control, ElementState::Visible, VISIBLE_TIMEOUT)
            .await
        {
            debug!(node = %control, error = %e, "search control not visible, clicking anyway");
        }
        host.click(&control).await?;
        info!(context = %context, "search submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForm, FakeHost, TestHelper};

    #[tokio::test]
    async fn test_button_found_by_accessible_name() {
        let host = FakeHost::new(FakeForm::scenario());
        let seed = TestHelper::scenario_seed(&["A"]);

        SearchTrigger::new(&seed.submit_labels)
            .fire(&host)
            .await
            .unwrap();
        assert_eq!(host.searches(), 1);
    }

    #[tokio::test]
    async fn test_input_value_fallback() {
        let host = FakeHost::new(FakeForm::scenario().with_unnamed_submit());
        let seed = TestHelper::scenario_seed(&["A"]);

        SearchTrigger::new(&seed.submit_labels)
            .fire(&host)
            .await
            .unwrap();
        assert_eq!(host.searches(), 1);
    }

    #[tokio::test]
    async fn test_missing_submit_is_fatal() {
        let host = FakeHost::new(FakeForm::scenario().remove_submit_after(0));
        let seed = TestHelper::scenario_seed(&["A"]);

        let err = SearchTrigger::new(&seed.submit_labels)
            .fire(&host)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::SubmitControlNotFound(_)));
        assert!(err.is_fatal());
    }
}
