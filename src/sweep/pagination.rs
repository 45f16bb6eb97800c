use crate::core::{FormHost, TimingConfig};
use crate::dom::TableLocator;
use crate::errors::{Result, ScrapeError};
use crate::form::ContextLocator;
use crate::types::{AriaRole, ContextId, ExtractedRecord, NodeHandle};
use crate::utils::settle;
use tracing::{debug, info, warn};

/// Rows gathered across every page of one result set.
#[derive(Debug, Default)]
pub struct PageWalk {
    pub records: Vec<ExtractedRecord>,
    pub pages: usize,
}

/// Extracts the current result page, follows "next" while an enabled one
/// exists, and stops at the page cap.
pub struct PaginationWalker<'a> {
    host: &'a dyn FormHost,
    tables: TableLocator<'a>,
    next_labels: &'a [String],
    page_cap: Option<usize>,
    timing: &'a TimingConfig,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        host: &'a dyn FormHost,
        tables: TableLocator<'a>,
        next_labels: &'a [String],
        page_cap: Option<usize>,
        timing: &'a TimingConfig,
    ) -> Self {
        Self {
            host,
            tables,
            next_labels,
            page_cap,
            timing,
        }
    }

    pub async fn walk(&self) -> Result<PageWalk> {
        let mut walk = PageWalk::default();

        loop {
            let mut context = ContextLocator::locate(self.host).await;
            match self.tables.extract(self.host, &context).await {
                Ok((table_context, rows)) => {
                    debug!(page = walk.pages + 1, rows = rows.len(), context = %table_context, "page extracted");
                    walk.records.extend(rows);
                    // The pager lives next to the table it pages.
                    context = table_context;
                }
                Err(ScrapeError::TableNotFound(reason)) => {
                    warn!(page = walk.pages + 1, %reason, "no results table on page");
                }
                Err(e) if walk.pages == 0 => return Err(e),
                Err(e) => {
                    warn!(page = walk.pages + 1, error = %e, "page extraction failed, keeping earlier pages");
                    break;
                }
            }
            walk.pages += 1;

            if let Some(cap) = self.page_cap {
                if walk.pages >= cap {
                    info!(cap, "page cap reached");
                    break;
                }
            }

            let next = match self.find_next(&context).await {
                Some(next) => next,
                None => break,
            };
            if let Err(e) = self.host.click(&next).await {
                warn!(error = %e, "could not follow next page");
                break;
            }
            if let Err(e) = self
                .host
                .wait_for_network_idle(self.timing.network_timeout())
                .await
            {
                debug!(error = %e, "network did not go idle after paging");
            }
            settle(self.timing.page_settle()).await;
        }

        Ok(walk)
    }

    async fn find_next(&self, context: &ContextId) -> Option<NodeHandle> {
        for label in self.next_labels {
            for role in [AriaRole::Link, AriaRole::Button] {
                let hits = match self.host.query_by_role(context, role, label).await {
                    Ok(hits) => hits,
                    Err(_) => continue,
                };
                for hit in hits {
                    if self.is_enabled(&hit).await {
                        return Some(hit);
                    }
                }
            }
        }
        None
    }

    /// Disabled when flagged by `disabled`, `aria-disabled="true"`, or a
    /// class containing "disabled". Unreadable controls count as disabled.
    async fn is_enabled(&self, node: &NodeHandle) -> bool {
        let read = |result: Result<Option<String>>| result.map_err(|_| ());

        match read(self.host.attribute(node, "disabled").await) {
            Ok(None) => {}
            _ => return false,
        }
        match read(self.host.attribute(node, "aria-disabled").await) {
            Ok(Some(value)) if value.trim().eq_ignore_ascii_case("true") => return false,
            Err(()) => return false,
            _ => {}
        }
        match read(self.host.attribute(node, "class").await) {
            Ok(Some(class)) => !class.split_whitespace().any(|c| c.contains("disabled")),
            Ok(None) => true,
            Err(()) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeForm, FakeHost, TestHelper};

    async fn walk(host: &FakeHost, page_cap: Option<usize>) -> PageWalk {
        let seed = TestHelper::scenario_seed(&["A"]);
        let timing = TimingConfig::immediate();
        let walker = PaginationWalker::new(
            host,
            TableLocator::new(&seed.header_keywords, seed.table_scan_limit),
            &seed.next_page_labels,
            page_cap,
            &timing,
        );
        walker.walk().await.unwrap()
    }

    #[tokio::test]
    async fn test_all_pages_are_collected() {
        let host = FakeHost::new(FakeForm::paged(vec![2, 2, 1]));
        let result = walk(&host, None).await;

        assert_eq!(result.pages, 3);
        assert_eq!(result.records.len(), 5);
        assert_eq!(result.records[4].no, "5");
    }

    #[tokio::test]
    async fn test_page_cap_stops_early() {
        let host = FakeHost::new(FakeForm::paged(vec![2, 2, 1]));
        let result = walk(&host, Some(2)).await;

        assert_eq!(result.pages, 2);
        assert_eq!(result.records.len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_next_ends_the_walk() {
        let host = FakeHost::new(FakeForm::paged(vec![1, 1]).with_disabled_last_next());
        let result = walk(&host, None).await;

        assert_eq!(result.pages, 2);
        assert_eq!(result.records.len(), 2);
    }

    #[tokio::test]
    async fn test_pager_is_followed_in_the_results_frame() {
        let host = FakeHost::new(
            FakeForm::paged(vec![2, 1]).with_results_in(ContextId::frame(vec![0])),
        );
        let result = walk(&host, None).await;

        assert_eq!(result.pages, 2);
        assert_eq!(result.records.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_table_counts_as_empty_page() {
        let host = FakeHost::new(FakeForm::paged(vec![]).without_tables());
        let result = walk(&host, None).await;

        assert_eq!(result.pages, 1);
        assert!(result.records.is_empty());
    }
}
