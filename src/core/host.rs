use crate::errors::Result;
use crate::types::{AriaRole, ContextId, ElementState, NodeHandle, Scope};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Automation primitives the form engine is written against.
///
/// Implementations hand out `NodeHandle`s that may go stale at any time:
/// once the host replaces a node, every call taking the old handle must fail
/// with `ScrapeError::StaleNode` rather than act on a different element.
#[async_trait]
pub trait FormHost: Send + Sync {
    /// All reachable browsing contexts, top document first.
    async fn contexts(&self) -> Result<Vec<ContextId>>;

    /// Elements with the given role whose accessible name equals `name`.
    async fn query_by_role(
        &self,
        context: &ContextId,
        role: AriaRole,
        name: &str,
    ) -> Result<Vec<NodeHandle>>;

    /// Elements matching a CSS selector, in document order.
    async fn query_all(&self, scope: Scope<'_>, css: &str) -> Result<Vec<NodeHandle>>;

    /// First element after `node` among its siblings that matches `css`.
    async fn next_sibling(&self, node: &NodeHandle, css: &str) -> Result<Option<NodeHandle>>;

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>>;

    /// Rendered text, trimmed.
    async fn text(&self, node: &NodeHandle) -> Result<String>;

    async fn outer_html(&self, node: &NodeHandle) -> Result<String>;

    async fn wait_for_state(
        &self,
        node: &NodeHandle,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()>;

    async fn click(&self, node: &NodeHandle) -> Result<()>;

    /// Native option selection by exact option label.
    async fn select_by_label(&self, node: &NodeHandle, label: &str) -> Result<()>;

    /// Runs `function(element, args)` in the page and returns its JSON result.
    async fn evaluate(&self, node: &NodeHandle, function: &str, args: Value) -> Result<Value>;

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;
}
