//! Identifies the region / sub-region / category dropdowns without relying
//! on fixed ids.
//!
//! Classification runs an ordered chain of strategies. Each strategy gets a
//! chance at every role still unresolved before the next strategy runs, so
//! the cheaper, more precise probes (accessible labels, declared attributes)
//! claim controls first and the content-signature pass only has to sort out
//! what is left.

use crate::core::{FormHost, SeedConfig};
use crate::errors::{Result, ScrapeError};
use crate::form::context::SELECTABLE_CSS;
use crate::form::options::read_option_labels;
use crate::types::{AriaRole, ContextId, ControlRole, NodeHandle, Scope};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const COMBOBOX_CSS: &str = "select, [role=\"combobox\"]";
pub const LABEL_CSS: &str = "label";

/// Controls already claimed by earlier strategies, keyed by role.
pub type ClaimedControls = HashMap<ControlRole, NodeHandle>;

#[async_trait]
pub trait ClassifyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Finds the control for `role`, or `None` when this strategy has no
    /// opinion. Returning an already-claimed control counts as `None`.
    async fn find(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
        role: ControlRole,
        claimed: &ClaimedControls,
    ) -> Result<Option<NodeHandle>>;
}

/// The three controls of one form session, as live handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub region: NodeHandle,
    pub subregion: NodeHandle,
    pub category: NodeHandle,
}

impl Classification {
    pub fn get(&self, role: ControlRole) -> &NodeHandle {
        match role {
            ControlRole::Region => &self.region,
            ControlRole::Subregion => &self.subregion,
            ControlRole::Category => &self.category,
        }
    }
}

fn is_claimed(claimed: &ClaimedControls, node: &NodeHandle) -> bool {
    claimed.values().any(|n| n == node)
}

/// Accessible name equal to one of the role's label synonyms, falling back
/// to a `<label>` element mentioning the synonym and the control it points
/// at: the `for` target, else the first select following the label, else a
/// select nested inside it.
pub struct LabelStrategy {
    labels: HashMap<ControlRole, Vec<String>>,
}

impl LabelStrategy {
    pub fn from_seed(seed: &SeedConfig) -> Self {
        let labels = ControlRole::CASCADE
            .iter()
            .map(|role| (*role, seed.labels_for(*role).labels.clone()))
            .collect();
        Self { labels }
    }

    async fn via_label_element(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
        synonym: &str,
        claimed: &ClaimedControls,
    ) -> Result<Option<NodeHandle>> {
        for label in host.query_all(Scope::Context(context), LABEL_CSS).await? {
            if !host.text(&label).await?.contains(synonym) {
                continue;
            }

            let mut targets = Vec::new();
            if let Some(for_id) = host.attribute(&label, "for").await? {
                if !for_id.is_empty() {
                    targets = host
                        .query_all(Scope::Context(context), &attribute_selector("id", &for_id))
                        .await?;
                }
            }
            if targets.is_empty() {
                if let Some(sibling) = host.next_sibling(&label, SELECTABLE_CSS).await? {
                    targets.push(sibling);
                }
            }
            if targets.is_empty() {
                targets = host.query_all(Scope::Node(&label), SELECTABLE_CSS).await?;
            }

            if let Some(target) = targets.into_iter().find(|t| !is_claimed(claimed, t)) {
                return Ok(Some(target));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ClassifyStrategy for LabelStrategy {
    fn name(&self) -> &'static str {
        "accessible-label"
    }

    async fn find(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
        role: ControlRole,
        claimed: &ClaimedControls,
    ) -> Result<Option<NodeHandle>> {
        let synonyms = match self.labels.get(&role) {
            Some(synonyms) => synonyms,
            None => return Ok(None),
        };

        for synonym in synonyms {
            let hits = host
                .query_by_role(context, AriaRole::Combobox, synonym)
                .await?;
            if let Some(hit) = hits.into_iter().find(|h| !is_claimed(claimed, h)) {
                return Ok(Some(hit));
            }
        }

        for synonym in synonyms {
            if let Some(hit) = self
                .via_label_element(host, context, synonym, claimed)
                .await?
            {
                return Ok(Some(hit));
            }
        }

        Ok(None)
    }
}

/// `title` or `aria-label` containing one of the role's keywords.
pub struct AttributeStrategy {
    keywords: HashMap<ControlRole, Vec<String>>,
}

impl AttributeStrategy {
    pub fn from_seed(seed: &SeedConfig) -> Self {
        let keywords = ControlRole::CASCADE
            .iter()
            .map(|role| (*role, seed.labels_for(*role).keywords.clone()))
            .collect();
        Self { keywords }
    }
}

#[async_trait]
impl ClassifyStrategy for AttributeStrategy {
    fn name(&self) -> &'static str {
        "declared-attribute"
    }

    async fn find(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
        role: ControlRole,
        claimed: &ClaimedControls,
    ) -> Result<Option<NodeHandle>> {
        let keywords = match self.keywords.get(&role) {
            Some(keywords) if !keywords.is_empty() => keywords,
            _ => return Ok(None),
        };

        for control in host.query_all(Scope::Context(context), COMBOBOX_CSS).await? {
            if is_claimed(claimed, &control) {
                continue;
            }
            for attribute in ["title", "aria-label"] {
                let value = host.attribute(&control, attribute).await?.unwrap_or_default();
                if !value.is_empty() && keywords.iter().any(|k| value.contains(k.as_str())) {
                    return Ok(Some(control));
                }
            }
        }

        Ok(None)
    }
}

/// Scores every select by how many of its options belong to the closed
/// region and category vocabularies.
pub struct SignatureStrategy {
    regions: HashSet<String>,
    categories: HashSet<String>,
}

#[derive(Debug, Default)]
struct SignatureAssignment {
    region: Option<NodeHandle>,
    subregion: Option<NodeHandle>,
    category: Option<NodeHandle>,
}

impl SignatureStrategy {
    pub fn from_seed(seed: &SeedConfig) -> Self {
        Self {
            regions: seed.regions.iter().map(|s| s.trim().to_string()).collect(),
            categories: seed.categories.iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    fn best(
        candidates: &[(NodeHandle, usize)],
        taken: &[&NodeHandle],
    ) -> Option<NodeHandle> {
        let mut best: Option<(&NodeHandle, usize)> = None;
        for (node, score) in candidates {
            if *score == 0 || taken.contains(&node) {
                continue;
            }
            if best.map(|(_, s)| *score > s).unwrap_or(true) {
                best = Some((node, *score));
            }
        }
        best.map(|(node, _)| node.clone())
    }

    async fn assign(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
        claimed: &ClaimedControls,
    ) -> Result<SignatureAssignment> {
        let selects = host.query_all(Scope::Context(context), SELECTABLE_CSS).await?;
        if selects.len() < 3 {
            debug!(context = %context, found = selects.len(), "too few selects for a signature match");
            return Ok(SignatureAssignment::default());
        }

        let mut region_scores = Vec::with_capacity(selects.len());
        let mut category_scores = Vec::with_capacity(selects.len());
        for select in &selects {
            let labels = read_option_labels(host, select).await?;
            let region_hits = labels.iter().filter(|l| self.regions.contains(*l)).count();
            let category_hits = labels.iter().filter(|l| self.categories.contains(*l)).count();
            region_scores.push((select.clone(), region_hits));
            category_scores.push((select.clone(), category_hits));
        }

        let others_claimed: Vec<&NodeHandle> = claimed.values().collect();

        let region = match claimed.get(&ControlRole::Region) {
            Some(node) => Some(node.clone()),
            None => Self::best(&region_scores, &others_claimed),
        };

        let category = match claimed.get(&ControlRole::Category) {
            Some(node) => Some(node.clone()),
            None => {
                let mut taken = others_claimed.clone();
                if let Some(region) = region.as_ref() {
                    taken.push(region);
                }
                Self::best(&category_scores, &taken)
            }
        };

        // Without both anchors the remainder is not meaningful.
        let (region, category) = match (region, category) {
            (Some(region), Some(category)) => (region, category),
            (region, category) => {
                return Ok(SignatureAssignment {
                    region,
                    subregion: None,
                    category,
                })
            }
        };

        let subregion = match claimed.get(&ControlRole::Subregion) {
            Some(node) => Some(node.clone()),
            None => {
                let remaining: Vec<(usize, &NodeHandle)> = selects
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| {
                        **s != region && **s != category && !is_claimed(claimed, s)
                    })
                    .collect();
                let region_position = selects.iter().position(|s| *s == region);
                remaining
                    .iter()
                    .find(|(i, _)| region_position.map(|r| *i > r).unwrap_or(false))
                    .or_else(|| remaining.first())
                    .map(|(_, s)| (*s).clone())
            }
        };

        Ok(SignatureAssignment {
            region: Some(region),
            subregion,
            category: Some(category),
        })
    }
}

#[async_trait]
impl ClassifyStrategy for SignatureStrategy {
    fn name(&self) -> &'static str {
        "content-signature"
    }

    async fn find(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
        role: ControlRole,
        claimed: &ClaimedControls,
    ) -> Result<Option<NodeHandle>> {
        let assignment = self.assign(host, context, claimed).await?;
        Ok(match role {
            ControlRole::Region => assignment.region,
            ControlRole::Subregion => assignment.subregion,
            ControlRole::Category => assignment.category,
        })
    }
}

pub struct ControlClassifier {
    strategies: Vec<Box<dyn ClassifyStrategy>>,
}

impl ControlClassifier {
    pub fn from_seed(seed: &SeedConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(LabelStrategy::from_seed(seed)),
            Box::new(AttributeStrategy::from_seed(seed)),
            Box::new(SignatureStrategy::from_seed(seed)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ClassifyStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn classify(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
    ) -> Result<Classification> {
        let mut claimed = ClaimedControls::new();

        for strategy in &self.strategies {
            for role in ControlRole::CASCADE {
                if claimed.contains_key(&role) {
                    continue;
                }
                match strategy.find(host, context, role, &claimed).await {
                    Ok(Some(node)) if !is_claimed(&claimed, &node) => {
                        debug!(strategy = strategy.name(), %role, node = %node, "control classified");
                        claimed.insert(role, node);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(strategy = strategy.name(), %role, error = %e, "strategy failed");
                    }
                }
            }
            if claimed.len() == ControlRole::CASCADE.len() {
                break;
            }
        }

        let mut take = |role: ControlRole| claimed.remove(&role);
        match (
            take(ControlRole::Region),
            take(ControlRole::Subregion),
            take(ControlRole::Category),
        ) {
            (Some(region), Some(subregion), Some(category)) => Ok(Classification {
                region,
                subregion,
                category,
            }),
            (region, subregion, category) => {
                let missing: Vec<&str> = [
                    (ControlRole::Region, region.is_none()),
                    (ControlRole::Subregion, subregion.is_none()),
                    (ControlRole::Category, category.is_none()),
                ]
                .iter()
                .filter(|(_, missing)| *missing)
                .map(|(role, _)| role.as_str())
                .collect();
                Err(ScrapeError::ControlsNotFound(format!(
                    "could not identify {} in {}",
                    missing.join(", "),
                    context
                )))
            }
        }
    }
}

/// `[name="value"]` with the value escaped for a CSS string.
pub fn attribute_selector(name: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("[{}=\"{}\"]", name, escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForm, FakeHost, TestHelper};

    async fn classify(host: &FakeHost) -> Result<Classification> {
        let seed = TestHelper::scenario_seed(&["A"]);
        let classifier = ControlClassifier::from_seed(&seed);
        classifier.classify(host, &ContextId::main()).await
    }

    async fn role_of(host: &FakeHost, node: &NodeHandle) -> ControlRole {
        host.role_of(node).expect("handle should point at a fake select")
    }

    #[tokio::test]
    async fn test_labels_identify_all_controls() {
        let host = FakeHost::new(FakeForm::scenario());
        let found = classify(&host).await.unwrap();

        assert_eq!(role_of(&host, &found.region).await, ControlRole::Region);
        assert_eq!(role_of(&host, &found.subregion).await, ControlRole::Subregion);
        assert_eq!(role_of(&host, &found.category).await, ControlRole::Category);
    }

    #[tokio::test]
    async fn test_second_category_synonym_is_accepted() {
        let host = FakeHost::new(
            FakeForm::scenario().with_label(ControlRole::Category, Some("참여유형명")),
        );
        let found = classify(&host).await.unwrap();
        assert_eq!(role_of(&host, &found.category).await, ControlRole::Category);
    }

    #[tokio::test]
    async fn test_label_element_text_is_followed_to_its_control() {
        let host = FakeHost::new(
            FakeForm::scenario().with_label(ControlRole::Region, Some("지역 선택")),
        );
        let found = classify(&host).await.unwrap();
        assert_eq!(role_of(&host, &found.region).await, ControlRole::Region);
    }

    #[tokio::test]
    async fn test_label_before_unassociated_select() {
        let host = FakeHost::new(FakeForm::scenario().with_sibling_labels());
        let seed = TestHelper::scenario_seed(&["A"]);
        let labels_only =
            ControlClassifier::with_strategies(vec![Box::new(LabelStrategy::from_seed(&seed))]);

        let found = labels_only
            .classify(&host, &ContextId::main())
            .await
            .unwrap();
        assert_eq!(role_of(&host, &found.region).await, ControlRole::Region);
        assert_eq!(role_of(&host, &found.subregion).await, ControlRole::Subregion);
        assert_eq!(role_of(&host, &found.category).await, ControlRole::Category);
    }

    #[tokio::test]
    async fn test_title_attribute_strategy() {
        let host = FakeHost::new(FakeForm::scenario().unlabeled().with_titles());
        let found = classify(&host).await.unwrap();

        assert_eq!(role_of(&host, &found.region).await, ControlRole::Region);
        assert_eq!(role_of(&host, &found.subregion).await, ControlRole::Subregion);
        assert_eq!(role_of(&host, &found.category).await, ControlRole::Category);
    }

    #[tokio::test]
    async fn test_content_signature_ignores_document_order() {
        let host = FakeHost::new(FakeForm::scenario().unlabeled().with_select_order([
            ControlRole::Category,
            ControlRole::Region,
            ControlRole::Subregion,
        ]));
        let found = classify(&host).await.unwrap();

        assert_eq!(role_of(&host, &found.region).await, ControlRole::Region);
        assert_eq!(role_of(&host, &found.subregion).await, ControlRole::Subregion);
        assert_eq!(role_of(&host, &found.category).await, ControlRole::Category);
    }

    #[tokio::test]
    async fn test_mixed_strategies_keep_controls_distinct() {
        // Only the category is labelled; the rest come from signatures.
        let host = FakeHost::new(
            FakeForm::scenario()
                .unlabeled()
                .with_label(ControlRole::Category, Some("참여유형")),
        );
        let found = classify(&host).await.unwrap();

        assert_ne!(found.region, found.subregion);
        assert_ne!(found.subregion, found.category);
        assert_eq!(role_of(&host, &found.subregion).await, ControlRole::Subregion);
    }

    #[tokio::test]
    async fn test_two_selects_is_controls_not_found() {
        let host = FakeHost::new(
            FakeForm::scenario()
                .unlabeled()
                .without_select(ControlRole::Subregion),
        );
        let err = classify(&host).await.unwrap_err();
        assert!(matches!(err, ScrapeError::ControlsNotFound(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_zero_signature_scores_is_controls_not_found() {
        let host = FakeHost::new(FakeForm::scenario().unlabeled());
        let mut seed = TestHelper::scenario_seed(&["nowhere"]);
        seed.categories = vec!["nothing".to_string()];

        let err = ControlClassifier::from_seed(&seed)
            .classify(&host, &ContextId::main())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::ControlsNotFound(_)));
    }

    #[test]
    fn test_attribute_selector_escapes_quotes() {
        assert_eq!(attribute_selector("id", "sel_region"), "[id=\"sel_region\"]");
        assert_eq!(attribute_selector("name", "a\"b"), "[name=\"a\\\"b\"]");
    }
}
