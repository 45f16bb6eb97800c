use crate::core::FormHost;
use crate::errors::{Result, ScrapeError};
use crate::form::classifier::{attribute_selector, Classification, ControlClassifier};
use crate::form::context::{ContextLocator, SELECTABLE_CSS};
use crate::types::{ContextId, ControlRole, NodeHandle, Scope};
use serde::Serialize;
use tracing::{debug, warn};

/// Everything needed to find a control again after the page re-renders it.
///
/// Fingerprints never hold live handles; callers resolve one immediately
/// before each interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlFingerprint {
    pub stable_id: Option<String>,
    pub stable_name: Option<String>,
    /// Position among the selectable controls of the form's context.
    pub ordinal_index: usize,
    pub role: ControlRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundForm {
    pub region: ControlFingerprint,
    pub subregion: ControlFingerprint,
    pub category: ControlFingerprint,
}

impl BoundForm {
    pub fn get(&self, role: ControlRole) -> &ControlFingerprint {
        match role {
            ControlRole::Region => &self.region,
            ControlRole::Subregion => &self.subregion,
            ControlRole::Category => &self.category,
        }
    }
}

pub struct Binder<'a> {
    host: &'a dyn FormHost,
    classifier: &'a ControlClassifier,
}

impl<'a> Binder<'a> {
    pub fn new(host: &'a dyn FormHost, classifier: &'a ControlClassifier) -> Self {
        Self { host, classifier }
    }

    /// Fingerprints a classified control. Custom widgets are fingerprinted
    /// through the native select they wrap.
    pub async fn bind(
        &self,
        context: &ContextId,
        node: &NodeHandle,
        role: ControlRole,
    ) -> Result<ControlFingerprint> {
        let selects = self
            .host
            .query_all(Scope::Context(context), SELECTABLE_CSS)
            .await?;

        let (ordinal_index, select) = match selects.iter().position(|s| s == node) {
            Some(index) => (index, node.clone()),
            None => {
                let nested = self.host.query_all(Scope::Node(node), SELECTABLE_CSS).await?;
                let inner = nested.into_iter().next().ok_or_else(|| {
                    ScrapeError::ElementNotFound(format!(
                        "{} control {} wraps no selectable element",
                        role, node
                    ))
                })?;
                let index = selects.iter().position(|s| *s == inner).ok_or_else(|| {
                    ScrapeError::ElementNotFound(format!(
                        "{} control {} is outside {}",
                        role, inner, context
                    ))
                })?;
                (index, inner)
            }
        };

        let fingerprint = ControlFingerprint {
            stable_id: non_empty(self.host.attribute(&select, "id").await?),
            stable_name: non_empty(self.host.attribute(&select, "name").await?),
            ordinal_index,
            role,
        };
        debug!(?fingerprint, "control bound");
        Ok(fingerprint)
    }

    pub async fn bind_all(
        &self,
        context: &ContextId,
        classification: &Classification,
    ) -> Result<BoundForm> {
        Ok(BoundForm {
            region: self
                .bind(context, &classification.region, ControlRole::Region)
                .await?,
            subregion: self
                .bind(context, &classification.subregion, ControlRole::Subregion)
                .await?,
            category: self
                .bind(context, &classification.category, ControlRole::Category)
                .await?,
        })
    }

    /// Finds the live control for a fingerprint: stable id, then stable
    /// name, then ordinal position, then a fresh classification.
    pub async fn resolve(&self, fingerprint: &ControlFingerprint) -> Result<NodeHandle> {
        let context = ContextLocator::locate(self.host).await;

        if let Some(id) = fingerprint.stable_id.as_deref() {
            if let Some(node) = self.unique(&context, &attribute_selector("id", id)).await {
                return Ok(node);
            }
        }

        if let Some(name) = fingerprint.stable_name.as_deref() {
            if let Some(node) = self.unique(&context, &attribute_selector("name", name)).await {
                return Ok(node);
            }
        }

        if let Ok(selects) = self
            .host
            .query_all(Scope::Context(&context), SELECTABLE_CSS)
            .await
        {
            if let Some(node) = selects.into_iter().nth(fingerprint.ordinal_index) {
                return Ok(node);
            }
        }

        warn!(role = %fingerprint.role, "fingerprint lookup failed, reclassifying the form");
        let classification = self.classifier.classify(self.host, &context).await?;
        let node = classification.get(fingerprint.role).clone();
        match self.host.query_all(Scope::Node(&node), SELECTABLE_CSS).await {
            Ok(nested) if !nested.is_empty() && !self.is_select(&context, &node).await => {
                Ok(nested.into_iter().next().unwrap_or(node))
            }
            _ => Ok(node),
        }
    }

    async fn unique(&self, context: &ContextId, css: &str) -> Option<NodeHandle> {
        match self.host.query_all(Scope::Context(context), css).await {
            Ok(mut hits) if hits.len() == 1 => hits.pop(),
            Ok(hits) => {
                if hits.len() > 1 {
                    debug!(css, matches = hits.len(), "ambiguous fingerprint attribute");
                }
                None
            }
            Err(_) => None,
        }
    }

    async fn is_select(&self, context: &ContextId, node: &NodeHandle) -> bool {
        self.host
            .query_all(Scope::Context(context), SELECTABLE_CSS)
            .await
            .map(|selects| selects.contains(node))
            .unwrap_or(false)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
