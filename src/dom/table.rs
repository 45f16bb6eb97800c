//! Results-table discovery and row extraction.
//!
//! The page renders layout tables alongside the results grid, so tables are
//! scored by how many expected header keywords they carry. Row parsing works
//! on the serialized table with `scraper` and never descends into nested
//! tables.

use crate::core::FormHost;
use crate::errors::{Result, ScrapeError};
use crate::types::{ContextId, ExtractedRecord, NodeHandle, Scope};
use scraper::{ElementRef, Html};
use tracing::{debug, warn};

pub const TABLE_CSS: &str = "table";

/// Cells read per row; missing cells become empty strings.
pub const RECORD_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Head,
    Body,
}

fn outermost_table(document: &Html) -> Option<ElementRef<'_>> {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

/// Rows owned directly by `table`, tagged with the section they sit in.
fn table_rows(table: ElementRef<'_>) -> Vec<(Section, ElementRef<'_>)> {
    let mut rows = Vec::new();
    for child in child_elements(table) {
        match child.value().name() {
            "thead" => rows.extend(
                child_elements(child)
                    .filter(|r| r.value().name() == "tr")
                    .map(|r| (Section::Head, r)),
            ),
            "tbody" | "tfoot" => rows.extend(
                child_elements(child)
                    .filter(|r| r.value().name() == "tr")
                    .map(|r| (Section::Body, r)),
            ),
            "tr" => rows.push((Section::Body, child)),
            _ => {}
        }
    }
    rows
}

fn row_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    child_elements(row)
        .filter(|c| matches!(c.value().name(), "td" | "th"))
        .collect()
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn header_text(table: ElementRef<'_>) -> String {
    let rows = table_rows(table);

    let head: Vec<String> = rows
        .iter()
        .filter(|(section, _)| *section == Section::Head)
        .flat_map(|(_, row)| row_cells(*row))
        .map(cell_text)
        .collect();
    if !head.is_empty() {
        return head.join(" ");
    }

    let th: Vec<String> = rows
        .iter()
        .flat_map(|(_, row)| row_cells(*row))
        .filter(|c| c.value().name() == "th")
        .map(cell_text)
        .collect();
    if !th.is_empty() {
        return th.join(" ");
    }

    rows.first()
        .map(|(_, row)| {
            row_cells(*row)
                .into_iter()
                .map(cell_text)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

/// Number of `keywords` appearing in the table's header text.
pub fn header_score(table_html: &str, keywords: &[String]) -> usize {
    let fragment = Html::parse_fragment(table_html);
    let header = match outermost_table(&fragment) {
        Some(table) => header_text(table),
        None => return 0,
    };
    keywords
        .iter()
        .filter(|k| !k.is_empty() && header.contains(k.as_str()))
        .count()
}

/// Data rows of the outermost table in `table_html`, untagged.
///
/// Header-section rows, rows without any `<td>`, and the single spanning
/// cell the site renders for "no results" are skipped.
pub fn parse_records(table_html: &str) -> Vec<ExtractedRecord> {
    let fragment = Html::parse_fragment(table_html);
    let table = match outermost_table(&fragment) {
        Some(table) => table,
        None => return Vec::new(),
    };

    let mut records = Vec::new();
    for (section, row) in table_rows(table) {
        if section == Section::Head {
            continue;
        }
        let cells = row_cells(row);
        if !cells.iter().any(|c| c.value().name() == "td") {
            continue;
        }
        if cells.len() == 1 && spans_columns(cells[0]) {
            continue;
        }

        let mut values = cells.into_iter().map(cell_text).take(RECORD_FIELDS);
        let mut next = || values.next().unwrap_or_default();

        records.push(ExtractedRecord {
            no: next(),
            entity_name: next(),
            application_type: next(),
            address: next(),
            category: next(),
            ..ExtractedRecord::default()
        });
    }
    records
}

fn spans_columns(cell: ElementRef<'_>) -> bool {
    cell.value()
        .attr("colspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map(|span| span > 1)
        .unwrap_or(false)
}

/// Picks the results table among the tables of a context and reads it.
pub struct TableLocator<'a> {
    keywords: &'a [String],
    scan_limit: usize,
}

impl<'a> TableLocator<'a> {
    pub fn new(keywords: &'a [String], scan_limit: usize) -> Self {
        Self {
            keywords,
            scan_limit,
        }
    }

    async fn tables_in(&self, host: &dyn FormHost, context: &ContextId) -> Vec<NodeHandle> {
        match host.query_all(Scope::Context(context), TABLE_CSS).await {
            Ok(tables) => tables,
            Err(e) => {
                debug!(context = %context, error = %e, "tables not queryable");
                Vec::new()
            }
        }
    }

    /// Highest header score among the first `scan_limit` tables wins; ties
    /// keep document order. With no keyword hits the first table is used.
    pub async fn locate(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
    ) -> Result<(NodeHandle, String)> {
        let mut tables = self.tables_in(host, context).await;
        if tables.is_empty() {
            let contexts = host.contexts().await.unwrap_or_default();
            for other in contexts.iter().filter(|c| *c != context) {
                tables = self.tables_in(host, other).await;
                if !tables.is_empty() {
                    debug!(context = %other, "results tables found outside the form context");
                    break;
                }
            }
        }

        let mut best: Option<(NodeHandle, String, usize)> = None;
        let mut first: Option<(NodeHandle, String)> = None;
        for table in tables.into_iter().take(self.scan_limit) {
            let html = match host.outer_html(&table).await {
                Ok(html) => html,
                Err(e) => {
                    debug!(node = %table, error = %e, "table vanished while scanning");
                    continue;
                }
            };
            let score = header_score(&html, self.keywords);
            if first.is_none() {
                first = Some((table.clone(), html.clone()));
            }
            if score > 0 && best.as_ref().map(|(_, _, s)| score > *s).unwrap_or(true) {
                best = Some((table, html, score));
            }
        }

        match (best, first) {
            (Some((table, html, score)), _) => {
                debug!(node = %table, score, "results table selected");
                Ok((table, html))
            }
            (None, Some((table, html))) => {
                warn!(node = %table, "no table matched the header keywords, using the first one");
                Ok((table, html))
            }
            (None, None) => Err(ScrapeError::TableNotFound(format!(
                "no tables visible from {}",
                context
            ))),
        }
    }

    /// Rows of the results table, with the context the table was found in.
    pub async fn extract(
        &self,
        host: &dyn FormHost,
        context: &ContextId,
    ) -> Result<(ContextId, Vec<ExtractedRecord>)> {
        let (table, html) = self.locate(host, context).await?;
        Ok((table.context, parse_records(&html)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SelectionCombination;

    fn keywords() -> Vec<String> {
        ["학습기업", "기업명", "신청유형", "주소", "종목"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    const RESULTS: &str = r#"
        <table class="list">
          <thead><tr><th>NO</th><th>학습기업명</th><th>참여신청유형</th><th>주소</th><th>종목</th></tr></thead>
          <tbody>
            <tr><td>1</td><td> (주)가나  다라 </td><td>단독기업형</td><td>서울시
                 강남구</td><td>기계</td></tr>
            <tr><td>2</td><td>마바</td><td>공동훈련센터형</td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_rows_are_parsed_and_padded() {
        let records = parse_records(RESULTS);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].no, "1");
        assert_eq!(records[0].entity_name, "(주)가나 다라");
        assert_eq!(records[0].address, "서울시 강남구");
        assert_eq!(records[1].address, "");
        assert_eq!(records[1].category, "");
        assert_eq!(records[1].combination, SelectionCombination::default());
    }

    #[test]
    fn test_no_data_row_is_skipped() {
        let html = r#"<table><thead><tr><th>학습기업명</th></tr></thead>
            <tbody><tr><td colspan="5">검색된 결과가 없습니다.</td></tr></tbody></table>"#;
        assert!(parse_records(html).is_empty());
    }

    #[test]
    fn test_header_only_rows_are_skipped_without_thead() {
        let html = r#"<table><tr><th>NO</th><th>학습기업명</th></tr><tr><td>7</td><td>사아</td></tr></table>"#;
        let records = parse_records(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_name, "사아");
    }

    #[test]
    fn test_nested_table_rows_are_ignored() {
        let html = r#"<table><tbody>
            <tr><td>1</td><td><table><tr><td>inner</td></tr></table> outer</td></tr>
        </tbody></table>"#;
        let records = parse_records(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity_name, "inner outer");
    }

    #[test]
    fn test_header_score_counts_keywords() {
        assert_eq!(header_score(RESULTS, &keywords()), 5);
        let layout = "<table><tr><td>메뉴</td><td>로그인</td></tr></table>";
        assert_eq!(header_score(layout, &keywords()), 0);
    }

    #[test]
    fn test_header_score_falls_back_to_th_then_first_row() {
        let th_only = "<table><tr><th>기업명</th><td>x</td></tr></table>";
        assert_eq!(header_score(th_only, &keywords()), 1);
        let first_row = "<table><tr><td>주소</td><td>종목</td></tr><tr><td>a</td></tr></table>";
        assert_eq!(header_score(first_row, &keywords()), 2);
    }
}
