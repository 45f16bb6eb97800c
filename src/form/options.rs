use crate::core::FormHost;
use crate::errors::Result;
use crate::types::{NodeHandle, Scope};

pub const OPTION_CSS: &str = "option";

/// Selectable labels of one control at one instant, placeholders removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    labels: Vec<String>,
    raw_count: usize,
}

impl OptionSet {
    pub fn from_labels(raw: Vec<String>, placeholders: &[String]) -> Self {
        let raw_count = raw.len();
        let mut labels: Vec<String> = Vec::with_capacity(raw_count);
        for label in raw {
            let label = label.trim().to_string();
            if is_placeholder(&label, placeholders) || labels.contains(&label) {
                continue;
            }
            labels.push(label);
        }
        Self { labels, raw_count }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label.trim())
    }

    /// Option count including placeholders, as the page renders it.
    pub fn raw_count(&self) -> usize {
        self.raw_count
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Blank labels and configured placeholder words ("선택", "-- select --")
/// never count as real choices. Comparison ignores case and punctuation.
pub fn is_placeholder(label: &str, placeholders: &[String]) -> bool {
    let normalized = normalize(label);
    normalized.is_empty() || placeholders.iter().any(|p| normalize(p) == normalized)
}

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Trimmed labels of every `<option>` under `node`, in document order.
pub async fn read_option_labels(host: &dyn FormHost, node: &NodeHandle) -> Result<Vec<String>> {
    let options = host.query_all(Scope::Node(node), OPTION_CSS).await?;
    let mut labels = Vec::with_capacity(options.len());
    for option in &options {
        labels.push(host.text(option).await?.trim().to_string());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForm, FakeHost};
    use crate::types::ContextId;

    fn placeholders() -> Vec<String> {
        vec!["선택".to_string(), "select".to_string()]
    }

    #[test]
    fn test_placeholders_are_excluded() {
        let set = OptionSet::from_labels(
            vec![
                "--선택--".to_string(),
                "서울".to_string(),
                " 부산 ".to_string(),
                "".to_string(),
            ],
            &placeholders(),
        );
        assert_eq!(set.labels(), &["서울".to_string(), "부산".to_string()]);
        assert_eq!(set.raw_count(), 4);
        assert!(set.contains("부산"));
        assert!(!set.contains("선택"));
    }

    #[test]
    fn test_placeholder_matching_ignores_case_and_decoration() {
        assert!(is_placeholder("- Select -", &placeholders()));
        assert!(is_placeholder("   ", &placeholders()));
        assert!(!is_placeholder("Selected region", &placeholders()));
    }

    #[test]
    fn test_duplicate_labels_collapse() {
        let set = OptionSet::from_labels(
            vec!["A".to_string(), "A".to_string(), "B".to_string()],
            &[],
        );
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_option_labels_read_in_document_order() {
        let host = FakeHost::new(FakeForm::scenario());
        let labels = tokio_test::block_on(async {
            let selects = host
                .query_all(Scope::Context(&ContextId::main()), "select")
                .await
                .unwrap();
            read_option_labels(&host, &selects[0]).await.unwrap()
        });
        assert_eq!(labels, vec!["선택", "A", "B"]);
    }
}
