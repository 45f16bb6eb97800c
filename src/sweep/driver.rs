use crate::core::{FormHost, SeedConfig, TimingConfig};
use crate::dom::TableLocator;
use crate::errors::{Result, ScrapeError};
use crate::form::{
    Binder, BoundForm, CascadingSelector, ContextLocator, ControlClassifier, OptionSet,
    SearchTrigger,
};
use crate::sweep::pagination::{PageWalk, PaginationWalker};
use crate::sweep::store::RecordStore;
use crate::types::{ExtractedRecord, SelectionCombination};
use crate::utils::settle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A combination (or a whole region branch) the sweep gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStep {
    pub region: String,
    pub subregion: Option<String>,
    pub category: Option<String>,
    pub kind: String,
    pub reason: String,
}

impl SkippedStep {
    fn combination(combination: &SelectionCombination, error: &ScrapeError) -> Self {
        Self {
            region: combination.region.clone(),
            subregion: Some(combination.subregion.clone()),
            category: Some(combination.category.clone()),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    fn region(region: &str, kind: &str, reason: String) -> Self {
        Self {
            region: region.to_string(),
            subregion: None,
            category: None,
            kind: kind.to_string(),
            reason,
        }
    }
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Deduplicated, in first-observed order.
    pub records: Vec<ExtractedRecord>,
    pub skips: Vec<SkippedStep>,
    pub combinations_visited: usize,
    pub pages_visited: usize,
    /// The error that ended the sweep early, if any. Records gathered
    /// before it are still in `records`.
    pub fatal: Option<ScrapeError>,
}

impl SweepOutcome {
    pub fn is_complete(&self) -> bool {
        self.fatal.is_none()
    }
}

#[derive(Default)]
struct SweepState {
    store: RecordStore,
    skips: Vec<SkippedStep>,
    combinations: usize,
    pages: usize,
}

/// Walks every (region, subregion, category) combination the form offers,
/// or the configured targets, and gathers the result rows of each.
pub struct SweepDriver<'a> {
    host: &'a dyn FormHost,
    seed: &'a SeedConfig,
    timing: &'a TimingConfig,
    classifier: ControlClassifier,
}

impl<'a> SweepDriver<'a> {
    pub fn new(host: &'a dyn FormHost, seed: &'a SeedConfig, timing: &'a TimingConfig) -> Self {
        Self {
            host,
            seed,
            timing,
            classifier: ControlClassifier::from_seed(seed),
        }
    }

    pub fn with_classifier(mut self, classifier: ControlClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Runs the sweep to completion or to the first fatal error. Never
    /// fails outright: the outcome carries whatever was collected.
    pub async fn run(&self) -> SweepOutcome {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = SweepState::default();

        let result = self
            .sweep(&mut state)
            .instrument(info_span!("sweep", session = %session_id))
            .await;

        let fatal = match result {
            Ok(()) => None,
            Err(e) => {
                error!(
                    session = %session_id,
                    error = %e,
                    records = state.store.len(),
                    "sweep aborted"
                );
                Some(e)
            }
        };

        let collected = state.store.len();
        let records = state.store.into_deduplicated();
        info!(
            session = %session_id,
            combinations = state.combinations,
            pages = state.pages,
            collected,
            unique = records.len(),
            skipped = state.skips.len(),
            "sweep finished"
        );

        SweepOutcome {
            session_id,
            started_at,
            finished_at: Utc::now(),
            records,
            skips: state.skips,
            combinations_visited: state.combinations,
            pages_visited: state.pages,
            fatal,
        }
    }

    async fn sweep(&self, state: &mut SweepState) -> Result<()> {
        let context = ContextLocator::locate(self.host).await;
        let classification = self.classifier.classify(self.host, &context).await?;
        let binder = Binder::new(self.host, &self.classifier);
        let form = binder.bind_all(&context, &classification).await?;
        info!(context = %context, ?form, "form bound");

        let selector = CascadingSelector::new(
            self.host,
            &binder,
            self.timing,
            &self.seed.placeholder_labels,
        );

        selector.wait_for_options(&form.region).await?;
        let live_regions = selector.read_options(&form.region).await?;
        debug!(regions = ?live_regions.labels(), "live regions");

        if !self.seed.targets.is_empty() {
            info!(targets = self.seed.targets.len(), "visiting configured combinations");
            for target in &self.seed.targets {
                if !live_regions.contains(&target.region) {
                    Self::skip_unavailable(&target.region, state);
                    continue;
                }
                self.visit(&selector, &form, target, state).await?;
            }
            return Ok(());
        }

        for region in &self.seed.regions {
            if !live_regions.contains(region) {
                Self::skip_unavailable(region, state);
                continue;
            }

            let (subregions, categories) = match self.region_branches(&selector, &form, region).await
            {
                Ok(branches) => branches,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(region = %region, error = %e, "skipping region");
                    state
                        .skips
                        .push(SkippedStep::region(region, e.kind(), e.to_string()));
                    continue;
                }
            };
            info!(
                region = %region,
                subregions = subregions.len(),
                categories = categories.len(),
                "region expanded"
            );

            for subregion in subregions.labels() {
                for category in categories.labels() {
                    let combination =
                        SelectionCombination::new(region.as_str(), subregion.as_str(), category.as_str());
                    self.visit(&selector, &form, &combination, state).await?;
                }
            }
        }

        Ok(())
    }

    fn skip_unavailable(region: &str, state: &mut SweepState) {
        warn!(region = %region, "region not offered by the form, skipping");
        state.skips.push(SkippedStep::region(
            region,
            "region_unavailable",
            "region is missing from the live options".to_string(),
        ));
    }

    /// Selects `region` and reads the dependent option sets once.
    async fn region_branches(
        &self,
        selector: &CascadingSelector<'_>,
        form: &BoundForm,
        region: &str,
    ) -> Result<(OptionSet, OptionSet)> {
        selector.select(&form.region, region).await?;
        selector.wait_for_options(&form.subregion).await?;
        let subregions = selector.read_options(&form.subregion).await?;
        selector.wait_for_options(&form.category).await?;
        let categories = selector.read_options(&form.category).await?;
        Ok((subregions, categories))
    }

    /// Only fatal errors escape; anything else is recorded as a skip.
    async fn visit(
        &self,
        selector: &CascadingSelector<'_>,
        form: &BoundForm,
        combination: &SelectionCombination,
        state: &mut SweepState,
    ) -> Result<()> {
        state.combinations += 1;
        match self.run_combination(selector, form, combination).await {
            Ok(walk) => {
                info!(
                    combination = %combination,
                    rows = walk.records.len(),
                    pages = walk.pages,
                    "combination collected"
                );
                state.pages += walk.pages;
                state.store.extend_tagged(combination, walk.records);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(combination = %combination, error = %e, "skipping combination");
                state.skips.push(SkippedStep::combination(combination, &e));
                Ok(())
            }
        }
    }

    async fn run_combination(
        &self,
        selector: &CascadingSelector<'_>,
        form: &BoundForm,
        combination: &SelectionCombination,
    ) -> Result<PageWalk> {
        selector.select(&form.region, &combination.region).await?;
        selector.wait_for_options(&form.subregion).await?;
        selector.select(&form.subregion, &combination.subregion).await?;
        selector.wait_for_options(&form.category).await?;
        selector.select(&form.category, &combination.category).await?;

        SearchTrigger::new(&self.seed.submit_labels)
            .fire(self.host)
            .await?;
        if let Err(e) = self
            .host
            .wait_for_network_idle(self.timing.network_timeout())
            .await
        {
            warn!(combination = %combination, error = %e, "network did not go idle after search");
        }
        settle(self.timing.search_settle()).await;

        PaginationWalker::new(
            self.host,
            TableLocator::new(&self.seed.header_keywords, self.seed.table_scan_limit),
            &self.seed.next_page_labels,
            self.seed.page_cap,
            self.timing,
        )
        .walk()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::SignatureStrategy;
    use crate::testing::{FakeForm, FakeHost, TestHelper};
    use crate::types::{ContextId, ControlRole};

    async fn sweep(host: &FakeHost, seed: &SeedConfig) -> SweepOutcome {
        let timing = TestHelper::timing();
        SweepDriver::new(host, seed, &timing).run().await
    }

    fn names(outcome: &SweepOutcome) -> Vec<&str> {
        outcome
            .records
            .iter()
            .map(|r| r.entity_name.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_full_sweep_collects_every_combination() {
        let host = FakeHost::new(FakeForm::scenario());
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["A"])).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.combinations_visited, 4);
        assert_eq!(outcome.pages_visited, 5);
        assert!(outcome.skips.is_empty());
        assert_eq!(
            host.search_log(),
            vec![
                SelectionCombination::new("A", "X", "P"),
                SelectionCombination::new("A", "X", "Q"),
                SelectionCombination::new("A", "Y", "P"),
                SelectionCombination::new("A", "Y", "Q"),
            ]
        );
    }

    #[tokio::test]
    async fn test_records_carry_their_combination() {
        let host = FakeHost::new(FakeForm::scenario());
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["A"])).await;

        assert_eq!(names(&outcome), vec!["(주)가나정밀", "다라산업(주)", "마바테크"]);
        assert_eq!(
            outcome.records[0].combination,
            SelectionCombination::new("A", "X", "P")
        );
        assert_eq!(
            outcome.records[2].combination,
            SelectionCombination::new("A", "Y", "P")
        );
    }

    #[tokio::test]
    async fn test_region_missing_from_form_is_never_selected() {
        let host = FakeHost::new(FakeForm::scenario());
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["Z", "A"])).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.skips.len(), 1);
        assert_eq!(outcome.skips[0].region, "Z");
        assert_eq!(outcome.skips[0].kind, "region_unavailable");
        assert!(host.search_log().iter().all(|c| c.region == "A"));
        let attempts = host.selection_attempts(ControlRole::Region);
        assert!(!attempts.is_empty());
        assert!(attempts.iter().all(|label| label == "A"));
    }

    #[tokio::test]
    async fn test_unpopulated_branch_is_skipped() {
        let host = FakeHost::new(FakeForm::scenario().with_empty_branch("B"));
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["B", "A"])).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.skips[0].region, "B");
        assert_eq!(outcome.skips[0].kind, "options_not_loaded");
    }

    #[tokio::test]
    async fn test_vanished_category_skips_only_that_combination() {
        let host = FakeHost::new(FakeForm::scenario().with_categories_after_first_search(&["P"]));
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["A"])).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.skips.len(), 2);
        assert!(outcome
            .skips
            .iter()
            .all(|s| s.kind == "selection_rejected" && s.category.as_deref() == Some("Q")));
    }

    #[tokio::test]
    async fn test_missing_submit_aborts_but_keeps_records() {
        let host = FakeHost::new(FakeForm::scenario().remove_submit_after(1));
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["A"])).await;

        assert!(!outcome.is_complete());
        assert!(matches!(
            outcome.fatal,
            Some(ScrapeError::SubmitControlNotFound(_))
        ));
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(host.searches(), 1);
    }

    #[tokio::test]
    async fn test_unidentifiable_form_is_fatal() {
        let host = FakeHost::new(
            FakeForm::scenario()
                .unlabeled()
                .without_select(ControlRole::Subregion),
        );
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["A"])).await;

        assert!(matches!(outcome.fatal, Some(ScrapeError::ControlsNotFound(_))));
        assert!(outcome.records.is_empty());
        assert_eq!(host.searches(), 0);
    }

    #[tokio::test]
    async fn test_form_inside_frame_with_custom_category() {
        let host = FakeHost::new(
            FakeForm::scenario()
                .in_context(ContextId::frame(vec![0]))
                .with_custom_widget(ControlRole::Category)
                .with_population_delay(2),
        );
        let outcome = sweep(&host, &TestHelper::scenario_seed(&["A"])).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(host.fallback_selections(), 4);
    }

    #[tokio::test]
    async fn test_targets_replace_the_full_sweep() {
        let mut seed = TestHelper::scenario_seed(&["A", "B"]);
        seed.targets = vec![
            SelectionCombination::new("A", "Y", "P"),
            SelectionCombination::new("A", "Y", "P"),
        ];
        let host = FakeHost::new(FakeForm::scenario());
        let outcome = sweep(&host, &seed).await;

        assert_eq!(outcome.combinations_visited, 2);
        assert_eq!(host.searches(), 2);
        assert_eq!(names(&outcome), vec!["마바테크"]);
    }

    #[tokio::test]
    async fn test_target_in_missing_region_is_never_selected() {
        let mut seed = TestHelper::scenario_seed(&["A"]);
        seed.targets = vec![
            SelectionCombination::new("Z", "X", "P"),
            SelectionCombination::new("A", "X", "P"),
        ];
        let host = FakeHost::new(FakeForm::scenario());
        let outcome = sweep(&host, &seed).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.combinations_visited, 1);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.skips.len(), 1);
        assert_eq!(outcome.skips[0].region, "Z");
        assert_eq!(outcome.skips[0].kind, "region_unavailable");
        assert_eq!(host.selection_attempts(ControlRole::Region), vec!["A"]);
    }

    #[tokio::test]
    async fn test_page_cap_limits_each_combination() {
        let mut seed = TestHelper::scenario_seed(&["A"]);
        seed.page_cap = Some(1);
        let host = FakeHost::new(FakeForm::scenario());
        let outcome = sweep(&host, &seed).await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.pages_visited, 4);
    }

    #[tokio::test]
    async fn test_custom_strategy_chain() {
        let seed = TestHelper::scenario_seed(&["A"]);
        let timing = TestHelper::timing();
        let host = FakeHost::new(FakeForm::scenario().unlabeled());
        let outcome = SweepDriver::new(&host, &seed, &timing)
            .with_classifier(ControlClassifier::with_strategies(vec![Box::new(
                SignatureStrategy::from_seed(&seed),
            )]))
            .run()
            .await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.records.len(), 3);
    }
}
