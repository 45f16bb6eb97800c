use crate::browser::navigation::NavigationManager;
use crate::core::{BrowserTrait, FormHost};
use crate::errors::{Result, ScrapeError};
use crate::types::{AriaRole, ContextId, ElementState, NodeHandle, Scope};
use crate::utils::javascript::{self, JavaScriptRunner};
use crate::utils::poll_until;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// `FormHost` built purely on in-page script evaluation, so any
/// `BrowserTrait` that can evaluate an expression in a tab can drive a form.
pub struct ScriptedFormHost<B: BrowserTrait> {
    browser: Arc<B>,
    tab: B::TabHandle,
    script_timeout_ms: u64,
    network_idle: Duration,
}

impl<B: BrowserTrait> ScriptedFormHost<B> {
    pub fn new(browser: Arc<B>, tab: B::TabHandle) -> Self {
        Self {
            browser,
            tab,
            script_timeout_ms: 15_000,
            network_idle: Duration::from_millis(500),
        }
    }

    pub fn with_network_idle(mut self, idle: Duration) -> Self {
        self.network_idle = idle;
        self
    }

    async fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        JavaScriptRunner::call_with_timeout(
            self.browser.as_ref(),
            &self.tab,
            function,
            args,
            self.script_timeout_ms,
        )
        .await
    }

    async fn call_on(&self, function: &str, node: &NodeHandle, extra: &[Value]) -> Result<Value> {
        let mut args = vec![json!(node.context.0), json!(node.key)];
        args.extend_from_slice(extra);
        self.call(function, &args).await
    }

    fn handles(context: &ContextId, value: Value) -> Result<Vec<NodeHandle>> {
        let keys: Vec<String> = serde_json::from_value(value)?;
        Ok(keys
            .into_iter()
            .map(|key| NodeHandle::new(context.clone(), key))
            .collect())
    }
}

#[async_trait]
impl<B> FormHost for ScriptedFormHost<B>
where
    B: BrowserTrait + 'static,
{
    async fn contexts(&self) -> Result<Vec<ContextId>> {
        let value = self.call(javascript::CONTEXTS, &[]).await?;
        let paths: Vec<Vec<usize>> = serde_json::from_value(value)?;
        Ok(paths.into_iter().map(ContextId::frame).collect())
    }

    async fn query_by_role(
        &self,
        context: &ContextId,
        role: AriaRole,
        name: &str,
    ) -> Result<Vec<NodeHandle>> {
        let value = self
            .call(
                javascript::QUERY_BY_ROLE,
                &[json!(context.0), json!(role.as_str()), json!(name)],
            )
            .await?;
        Self::handles(context, value)
    }

    async fn query_all(&self, scope: Scope<'_>, css: &str) -> Result<Vec<NodeHandle>> {
        let (context, key) = match scope {
            Scope::Context(ctx) => (ctx, Value::Null),
            Scope::Node(node) => (&node.context, json!(node.key)),
        };
        let value = self
            .call(javascript::QUERY_ALL, &[json!(context.0), key, json!(css)])
            .await?;
        Self::handles(context, value)
    }

    async fn next_sibling(&self, node: &NodeHandle, css: &str) -> Result<Option<NodeHandle>> {
        let value = self
            .call_on(javascript::NEXT_SIBLING, node, &[json!(css)])
            .await?;
        Ok(value
            .as_str()
            .map(|key| NodeHandle::new(node.context.clone(), key)))
    }

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>> {
        let value = self
            .call_on(javascript::ATTRIBUTE, node, &[json!(name)])
            .await?;
        Ok(value.as_str().map(|s| s.to_string()))
    }

    async fn text(&self, node: &NodeHandle) -> Result<String> {
        let value = self.call_on(javascript::TEXT, node, &[]).await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn outer_html(&self, node: &NodeHandle) -> Result<String> {
        let value = self.call_on(javascript::OUTER_HTML, node, &[]).await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn wait_for_state(
        &self,
        node: &NodeHandle,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()> {
        let reached = poll_until(timeout, Duration::from_millis(100), || async {
            let value = self.call_on(javascript::NODE_STATE, node, &[]).await?;
            let attached = value.get("attached").and_then(|v| v.as_bool()).unwrap_or(false);
            if !attached {
                return Err(ScrapeError::StaleNode(node.to_string()));
            }
            Ok(match state {
                ElementState::Attached => true,
                ElementState::Visible => {
                    value.get("visible").and_then(|v| v.as_bool()).unwrap_or(false)
                }
            })
        })
        .await?;

        if reached {
            Ok(())
        } else {
            Err(ScrapeError::TimeoutError(format!(
                "{} did not become {} within {}ms",
                node,
                state.as_str(),
                timeout.as_millis()
            )))
        }
    }

    async fn click(&self, node: &NodeHandle) -> Result<()> {
        self.call_on(javascript::CLICK, node, &[]).await?;
        Ok(())
    }

    async fn select_by_label(&self, node: &NodeHandle, label: &str) -> Result<()> {
        let status = self
            .call_on(javascript::SELECT_NATIVE, node, &[json!(label)])
            .await?;
        match status.as_str() {
            Some("ok") => Ok(()),
            other => {
                debug!(node = %node, label, status = ?other, "native selection rejected");
                Err(ScrapeError::ElementNotFound(format!(
                    "native option '{}' not selectable: {}",
                    label,
                    other.unwrap_or("unknown")
                )))
            }
        }
    }

    async fn evaluate(&self, node: &NodeHandle, function: &str, args: Value) -> Result<Value> {
        self.call_on(javascript::EVALUATE_ON_NODE, node, &[json!(function), args])
            .await
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let result = NavigationManager::wait_for_network_idle(
            self.browser.as_ref(),
            &self.tab,
            self.network_idle,
            timeout,
        )
        .await?;
        debug!(url = %result.url, duration_ms = result.duration_ms, "network idle");
        Ok(())
    }
}
