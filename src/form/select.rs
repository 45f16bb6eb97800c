use crate::core::{FormHost, TimingConfig};
use crate::errors::{Result, ScrapeError};
use crate::form::binder::{Binder, ControlFingerprint};
use crate::form::options::{read_option_labels, OptionSet};
use crate::types::NodeHandle;
use crate::utils::javascript::SELECT_OPTION_FALLBACK;
use crate::utils::{poll_until, settle};
use serde_json::json;
use std::future::Future;
use tracing::{debug, info, warn};

/// Minimum rendered options (placeholder included) before a dependent
/// control counts as populated.
pub const MIN_POPULATED_OPTIONS: usize = 2;

/// Drives the dependent dropdowns: every interaction resolves its control
/// fresh through the binder, and every selection is followed by the
/// control's settle delay so the page can repopulate what depends on it.
pub struct CascadingSelector<'a> {
    host: &'a dyn FormHost,
    binder: &'a Binder<'a>,
    timing: &'a TimingConfig,
    placeholders: &'a [String],
}

impl<'a> CascadingSelector<'a> {
    pub fn new(
        host: &'a dyn FormHost,
        binder: &'a Binder<'a>,
        timing: &'a TimingConfig,
        placeholders: &'a [String],
    ) -> Self {
        Self {
            host,
            binder,
            timing,
            placeholders,
        }
    }

    /// Selects `label` on a live node: native selection first, then a
    /// scripted fallback that sets the option and dispatches input/change.
    pub async fn select_option(&self, node: &NodeHandle, label: &str) -> Result<()> {
        match self.host.select_by_label(node, label).await {
            Ok(()) => return Ok(()),
            Err(ScrapeError::StaleNode(reason)) => return Err(ScrapeError::StaleNode(reason)),
            Err(e) => debug!(node = %node, label, error = %e, "native selection failed, using scripted fallback"),
        }

        let selected = self
            .host
            .evaluate(node, SELECT_OPTION_FALLBACK, json!({ "label": label }))
            .await?;

        if selected.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(ScrapeError::SelectionRejected(format!(
                "no option labelled '{}' on {}",
                label, node
            )))
        }
    }

    /// Resolves and selects, retrying once when the node goes stale
    /// between resolution and use.
    pub async fn select(&self, fingerprint: &ControlFingerprint, label: &str) -> Result<()> {
        self.with_fresh_node(fingerprint, move |node| async move {
            self.select_option(&node, label).await
        })
        .await?;

        info!(role = %fingerprint.role, label, "option selected");
        settle(self.timing.settle_after(fingerprint.role)).await;
        Ok(())
    }

    /// Waits until the control renders enough options to be usable.
    pub async fn wait_for_options(&self, fingerprint: &ControlFingerprint) -> Result<()> {
        let populated = poll_until(
            self.timing.option_timeout(),
            self.timing.option_poll(),
            || async {
                let count = match self.binder.resolve(fingerprint).await {
                    Ok(node) => read_option_labels(self.host, &node)
                        .await
                        .map(|labels| labels.len())
                        .unwrap_or(0),
                    Err(_) => 0,
                };
                Ok(count >= MIN_POPULATED_OPTIONS)
            },
        )
        .await?;

        if populated {
            Ok(())
        } else {
            warn!(role = %fingerprint.role, "options never populated");
            Err(ScrapeError::OptionsNotLoaded(format!(
                "{} had fewer than {} options after {}ms",
                fingerprint.role,
                MIN_POPULATED_OPTIONS,
                self.timing.option_timeout().as_millis()
            )))
        }
    }

    pub async fn read_options(&self, fingerprint: &ControlFingerprint) -> Result<OptionSet> {
        let labels = self
            .with_fresh_node(fingerprint, move |node| async move {
                read_option_labels(self.host, &node).await
            })
            .await?;
        Ok(OptionSet::from_labels(labels, self.placeholders))
    }

    async fn with_fresh_node<T, F, Fut>(&self, fingerprint: &ControlFingerprint, op: F) -> Result<T>
    where
        F: Fn(NodeHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let node = self.binder.resolve(fingerprint).await?;
        match op(node).await {
            Err(ScrapeError::StaleNode(reason)) => {
                debug!(role = %fingerprint.role, %reason, "control went stale, resolving again");
                let node = self.binder.resolve(fingerprint).await?;
                op(node).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimingConfig;
    use crate::form::binder::BoundForm;
    use crate::form::classifier::ControlClassifier;
    use crate::testing::{FakeForm, FakeHost, TestHelper};
    use crate::types::{ContextId, ControlRole};

    async fn bind(host: &FakeHost, classifier: &ControlClassifier) -> BoundForm {
        let context = ContextId::main();
        let classification = classifier.classify(host, &context).await.unwrap();
        Binder::new(host, classifier)
            .bind_all(&context, &classification)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_subregion_options_follow_region() {
        let host = FakeHost::new(FakeForm::scenario());
        let seed = TestHelper::scenario_seed(&["A", "B"]);
        let classifier = ControlClassifier::from_seed(&seed);
        let form = bind(&host, &classifier).await;
        let binder = Binder::new(&host, &classifier);
        let timing = TimingConfig::immediate();
        let selector = CascadingSelector::new(&host, &binder, &timing, &seed.placeholder_labels);

        selector.select(&form.region, "A").await.unwrap();
        selector.wait_for_options(&form.subregion).await.unwrap();
        let subregions = selector.read_options(&form.subregion).await.unwrap();

        assert_eq!(subregions.labels(), &["X".to_string(), "Y".to_string()]);
        assert_eq!(host.selected(ControlRole::Region).as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_slow_population_is_awaited() {
        let host = FakeHost::new(FakeForm::scenario().with_population_delay(3));
        let seed = TestHelper::scenario_seed(&["A"]);
        let classifier = ControlClassifier::from_seed(&seed);
        let form = bind(&host, &classifier).await;
        let binder = Binder::new(&host, &classifier);
        let timing = TimingConfig::immediate();
        let selector = CascadingSelector::new(&host, &binder, &timing, &seed.placeholder_labels);

        selector.select(&form.region, "A").await.unwrap();
        selector.wait_for_options(&form.subregion).await.unwrap();
        assert_eq!(selector.read_options(&form.subregion).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unpopulated_control_times_out() {
        let host = FakeHost::new(FakeForm::scenario().with_empty_branch("B"));
        let seed = TestHelper::scenario_seed(&["B"]);
        let classifier = ControlClassifier::from_seed(&seed);
        let form = bind(&host, &classifier).await;
        let binder = Binder::new(&host, &classifier);
        let timing = TimingConfig::immediate();
        let selector = CascadingSelector::new(&host, &binder, &timing, &seed.placeholder_labels);

        selector.select(&form.region, "B").await.unwrap();
        let err = selector.wait_for_options(&form.subregion).await.unwrap_err();
        assert!(matches!(err, ScrapeError::OptionsNotLoaded(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_custom_widget_uses_scripted_fallback() {
        let host = FakeHost::new(FakeForm::scenario().with_custom_widget(ControlRole::Category));
        let seed = TestHelper::scenario_seed(&["A"]);
        let classifier = ControlClassifier::from_seed(&seed);
        let form = bind(&host, &classifier).await;
        let binder = Binder::new(&host, &classifier);
        let timing = TimingConfig::immediate();
        let selector = CascadingSelector::new(&host, &binder, &timing, &seed.placeholder_labels);

        selector.select(&form.category, "Q").await.unwrap();

        assert_eq!(host.selected(ControlRole::Category).as_deref(), Some("Q"));
        assert_eq!(host.fallback_selections(), 1);
    }

    #[tokio::test]
    async fn test_unknown_label_is_rejected() {
        let host = FakeHost::new(FakeForm::scenario());
        let seed = TestHelper::scenario_seed(&["A"]);
        let classifier = ControlClassifier::from_seed(&seed);
        let form = bind(&host, &classifier).await;
        let binder = Binder::new(&host, &classifier);
        let timing = TimingConfig::immediate();
        let selector = CascadingSelector::new(&host, &binder, &timing, &seed.placeholder_labels);

        let err = selector.select(&form.category, "Z").await.unwrap_err();
        assert!(matches!(err, ScrapeError::SelectionRejected(_)));
    }

    #[tokio::test]
    async fn test_stale_node_is_resolved_again() {
        let host = FakeHost::new(FakeForm::scenario());
        let seed = TestHelper::scenario_seed(&["A"]);
        let classifier = ControlClassifier::from_seed(&seed);
        let form = bind(&host, &classifier).await;
        let binder = Binder::new(&host, &classifier);
        let timing = TimingConfig::immediate();
        let selector = CascadingSelector::new(&host, &binder, &timing, &seed.placeholder_labels);

        host.churn_on_next_access();
        selector.select(&form.region, "B").await.unwrap();
        assert_eq!(host.selected(ControlRole::Region).as_deref(), Some("B"));
    }
}
