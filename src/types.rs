use serde::{Deserialize, Serialize};
use std::fmt;

/// Functional role of one of the three cascading dropdowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlRole {
    Region,
    Subregion,
    Category,
}

impl ControlRole {
    /// Roles in the order their selections depend on each other.
    pub const CASCADE: [ControlRole; 3] = [
        ControlRole::Region,
        ControlRole::Subregion,
        ControlRole::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlRole::Region => "region",
            ControlRole::Subregion => "subregion",
            ControlRole::Category => "category",
        }
    }
}

impl fmt::Display for ControlRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A browsing context: the top document (empty path) or a frame reached by
/// following frame indices from the top document down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Vec<usize>);

impl ContextId {
    pub fn main() -> Self {
        Self(Vec::new())
    }

    pub fn frame(path: Vec<usize>) -> Self {
        Self(path)
    }

    pub fn is_main(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            return f.write_str("main");
        }
        let path: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "frame[{}]", path.join("/"))
    }
}

/// Short-lived reference to a live DOM node, issued by a `FormHost`.
///
/// Only valid until the host replaces the node. Never keep one across an
/// interaction; re-resolve through a `ControlFingerprint` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub context: ContextId,
    pub key: String,
}

impl NodeHandle {
    pub fn new(context: ContextId, key: impl Into<String>) -> Self {
        Self {
            context,
            key: key.into(),
        }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.context, self.key)
    }
}

/// Where a CSS query is evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    Context(&'a ContextId),
    Node(&'a NodeHandle),
}

/// Accessibility roles the engine queries by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AriaRole {
    Combobox,
    Button,
    Link,
}

impl AriaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AriaRole::Combobox => "combobox",
            AriaRole::Button => "button",
            AriaRole::Link => "link",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Attached,
    Visible,
}

impl ElementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementState::Attached => "attached",
            ElementState::Visible => "visible",
        }
    }
}

/// One (region, subregion, category) triple driving a query/extraction cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionCombination {
    pub region: String,
    pub subregion: String,
    pub category: String,
}

impl SelectionCombination {
    pub fn new(
        region: impl Into<String>,
        subregion: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            subregion: subregion.into(),
            category: category.into(),
        }
    }

    pub fn label_for(&self, role: ControlRole) -> &str {
        match role {
            ControlRole::Region => &self.region,
            ControlRole::Subregion => &self.subregion,
            ControlRole::Category => &self.category,
        }
    }
}

impl fmt::Display for SelectionCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.region, self.subregion, self.category)
    }
}

/// One result row plus the combination it was observed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub no: String,
    pub entity_name: String,
    pub application_type: String,
    pub address: String,
    pub category: String,
    pub combination: SelectionCombination,
}

impl ExtractedRecord {
    pub fn with_combination(mut self, combination: &SelectionCombination) -> Self {
        self.combination = combination.clone();
        self
    }
}
