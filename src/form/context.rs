use crate::core::FormHost;
use crate::types::{ContextId, Scope};
use tracing::{debug, warn};

/// Native selectable controls; custom widgets expose one underneath.
pub const SELECTABLE_CSS: &str = "select";

pub struct ContextLocator;

impl ContextLocator {
    /// Picks the browsing context exposing the most selectable controls.
    ///
    /// Never fails: unreachable frames score zero, and the top document wins
    /// whenever it shares the best score or nothing can be queried at all.
    pub async fn locate(host: &dyn FormHost) -> ContextId {
        let contexts = match host.contexts().await {
            Ok(contexts) if !contexts.is_empty() => contexts,
            Ok(_) => return ContextId::main(),
            Err(e) => {
                warn!(error = %e, "could not enumerate browsing contexts, using main document");
                return ContextId::main();
            }
        };

        let mut best = ContextId::main();
        let mut best_score = 0usize;
        let mut main_score = 0usize;

        for context in contexts {
            let score = match host.query_all(Scope::Context(&context), SELECTABLE_CSS).await {
                Ok(controls) => controls.len(),
                Err(e) => {
                    debug!(context = %context, error = %e, "context not queryable");
                    0
                }
            };

            if context.is_main() {
                main_score = score;
            }
            if score > best_score {
                best_score = score;
                best = context;
            }
        }

        if best_score == main_score {
            best = ContextId::main();
        }

        debug!(context = %best, controls = best_score, "form context located");
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForm, FakeHost};

    #[tokio::test]
    async fn test_form_inside_nested_frame_is_found() {
        let host = FakeHost::new(
            FakeForm::scenario()
                .in_context(ContextId::frame(vec![1, 0]))
                .with_decoy(ContextId::frame(vec![0]), 1),
        );

        let context = ContextLocator::locate(&host).await;
        assert_eq!(context, ContextId::frame(vec![1, 0]));
    }

    #[tokio::test]
    async fn test_main_document_wins_ties() {
        let host = FakeHost::new(FakeForm::scenario().with_decoy(ContextId::frame(vec![0]), 3));

        let context = ContextLocator::locate(&host).await;
        assert!(context.is_main());
    }

    #[tokio::test]
    async fn test_enumeration_failure_falls_back_to_main() {
        let host = FakeHost::new(
            FakeForm::scenario().in_context(ContextId::frame(vec![0])),
        );
        host.fail_context_enumeration(true);

        let context = ContextLocator::locate(&host).await;
        assert!(context.is_main());
    }
}
