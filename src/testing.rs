//! In-memory `FormHost` for exercising the sweep without a browser.
//!
//! `FakeForm` describes a cascading search form the way the live site
//! renders it: dependent options that only appear after the parent is
//! chosen, nodes that are replaced on every re-render, a layout table in
//! front of the results grid, and a pager. `FakeHost` serves it through the
//! same primitives the scripted Chrome host provides.

use crate::core::{FormHost, SeedConfig, TimingConfig};
use crate::errors::{Result, ScrapeError};
use crate::form::classifier::COMBOBOX_CSS;
use crate::form::submit::CLICKABLE_CSS;
use crate::types::{
    AriaRole, ContextId, ControlRole, ElementState, ExtractedRecord, NodeHandle, Scope,
    SelectionCombination,
};
use crate::utils::javascript::SELECT_OPTION_FALLBACK;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const PLACEHOLDER: &str = "선택";
const SUBMIT_LABEL: &str = "검색";
const NEXT_LABEL: &str = "다음";
const RESULT_HEADERS: [&str; 5] = ["NO", "학습기업명", "참여신청유형", "주소", "종목"];

pub struct TestHelper;

impl TestHelper {
    /// Seed matching `FakeForm::scenario`, sweeping `regions`.
    pub fn scenario_seed(regions: &[&str]) -> SeedConfig {
        SeedConfig {
            url: "http://form.test/search".to_string(),
            regions: regions.iter().map(|r| r.to_string()).collect(),
            categories: vec!["P".to_string(), "Q".to_string()],
            ..SeedConfig::default()
        }
    }

    pub fn timing() -> TimingConfig {
        TimingConfig::immediate()
    }

    pub fn row(no: usize, entity_name: &str, application_type: &str) -> ExtractedRecord {
        ExtractedRecord {
            no: no.to_string(),
            entity_name: entity_name.to_string(),
            application_type: application_type.to_string(),
            address: "서울특별시 강남구".to_string(),
            category: "기계".to_string(),
            ..ExtractedRecord::default()
        }
    }
}

/// Declarative description of the fake page.
#[derive(Debug, Clone)]
pub struct FakeForm {
    context: ContextId,
    results_context: Option<ContextId>,
    decoys: Vec<(ContextId, usize)>,
    order: Vec<ControlRole>,
    labels: HashMap<ControlRole, String>,
    titles: bool,
    stable_attributes: bool,
    sibling_labels: bool,
    custom_widget: Option<ControlRole>,
    regions: Vec<String>,
    subregions: HashMap<String, Vec<String>>,
    categories: Vec<String>,
    categories_after_first_search: Option<Vec<String>>,
    population_delay: usize,
    results: HashMap<SelectionCombination, Vec<Vec<ExtractedRecord>>>,
    static_pages: Option<Vec<Vec<ExtractedRecord>>>,
    unnamed_submit: bool,
    remove_submit_after: Option<usize>,
    disabled_last_next: bool,
    tables: bool,
}

impl FakeForm {
    /// Regions {A, B}; A offers sub-regions {X, Y}, B offers {Z}; categories
    /// {P, Q}. (A,X,P) has two rows, (A,Y,P) has an empty first page whose
    /// second page holds one row, every other combination is empty.
    pub fn scenario() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut subregions = HashMap::new();
        subregions.insert("A".to_string(), strings(&["X", "Y"]));
        subregions.insert("B".to_string(), strings(&["Z"]));

        let mut results = HashMap::new();
        results.insert(
            SelectionCombination::new("A", "X", "P"),
            vec![vec![
                TestHelper::row(1, "(주)가나정밀", "단독기업형"),
                TestHelper::row(2, "다라산업(주)", "단독기업형"),
            ]],
        );
        results.insert(
            SelectionCombination::new("A", "Y", "P"),
            vec![vec![], vec![TestHelper::row(1, "마바테크", "공동훈련센터형")]],
        );

        let mut labels = HashMap::new();
        labels.insert(ControlRole::Region, "지역".to_string());
        labels.insert(ControlRole::Subregion, "지사".to_string());
        labels.insert(ControlRole::Category, "참여유형".to_string());

        Self {
            context: ContextId::main(),
            results_context: None,
            decoys: Vec::new(),
            order: ControlRole::CASCADE.to_vec(),
            labels,
            titles: false,
            stable_attributes: true,
            sibling_labels: false,
            custom_widget: None,
            regions: strings(&["A", "B"]),
            subregions,
            categories: strings(&["P", "Q"]),
            categories_after_first_search: None,
            population_delay: 0,
            results,
            static_pages: None,
            unnamed_submit: false,
            remove_submit_after: None,
            disabled_last_next: false,
            tables: true,
        }
    }

    /// Scenario form with a result set already on screen, split into pages
    /// of the given sizes and numbered continuously.
    pub fn paged(page_sizes: Vec<usize>) -> Self {
        let mut next_no = 0;
        let pages = page_sizes
            .into_iter()
            .map(|size| {
                (0..size)
                    .map(|_| {
                        next_no += 1;
                        TestHelper::row(next_no, &format!("기업{}", next_no), "단독기업형")
                    })
                    .collect()
            })
            .collect();
        Self {
            static_pages: Some(pages),
            ..Self::scenario()
        }
    }

    pub fn in_context(mut self, context: ContextId) -> Self {
        self.context = context;
        self
    }

    /// Renders the results tables and the pager in `context` instead of
    /// next to the form.
    pub fn with_results_in(mut self, context: ContextId) -> Self {
        self.results_context = Some(context);
        self
    }

    /// Adds `selects` unrelated dropdowns to `context`.
    pub fn with_decoy(mut self, context: ContextId, selects: usize) -> Self {
        self.decoys.push((context, selects));
        self
    }

    pub fn with_label(mut self, role: ControlRole, label: Option<&str>) -> Self {
        match label {
            Some(label) => self.labels.insert(role, label.to_string()),
            None => self.labels.remove(&role),
        };
        self
    }

    pub fn unlabeled(mut self) -> Self {
        self.labels.clear();
        self
    }

    /// Gives every dropdown a descriptive `title`.
    pub fn with_titles(mut self) -> Self {
        self.titles = true;
        self
    }

    pub fn with_select_order(mut self, order: [ControlRole; 3]) -> Self {
        self.order = order.to_vec();
        self
    }

    pub fn without_select(mut self, role: ControlRole) -> Self {
        self.order.retain(|r| *r != role);
        self.labels.remove(&role);
        self
    }

    /// Drops `id`/`name` from the dropdowns; labels then wrap their control.
    pub fn without_stable_attributes(mut self) -> Self {
        self.stable_attributes = false;
        self
    }

    /// Labels carry no `for` and sit directly before their dropdown, so the
    /// dropdowns have no accessible name.
    pub fn with_sibling_labels(mut self) -> Self {
        self.sibling_labels = true;
        self
    }

    /// Renders `role` as an ARIA combobox over a native select that refuses
    /// direct selection.
    pub fn with_custom_widget(mut self, role: ControlRole) -> Self {
        self.custom_widget = Some(role);
        self
    }

    /// Sub-region options stay unpopulated for this many option reads after
    /// each region change.
    pub fn with_population_delay(mut self, reads: usize) -> Self {
        self.population_delay = reads;
        self
    }

    pub fn with_empty_branch(mut self, region: &str) -> Self {
        self.subregions.insert(region.to_string(), Vec::new());
        self
    }

    pub fn with_categories_after_first_search(mut self, categories: &[&str]) -> Self {
        self.categories_after_first_search =
            Some(categories.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Submit is an input button whose accessible name is not a search label.
    pub fn with_unnamed_submit(mut self) -> Self {
        self.unnamed_submit = true;
        self
    }

    /// The submit control disappears once `searches` searches have run.
    pub fn remove_submit_after(mut self, searches: usize) -> Self {
        self.remove_submit_after = Some(searches);
        self
    }

    /// Keeps a disabled "next" link on the last page instead of hiding it.
    pub fn with_disabled_last_next(mut self) -> Self {
        self.disabled_last_next = true;
        self
    }

    pub fn without_tables(mut self) -> Self {
        self.tables = false;
        self
    }

    fn select_id(role: ControlRole) -> String {
        format!("sel_{}", role.as_str())
    }

    fn select_name(role: ControlRole) -> &'static str {
        match role {
            ControlRole::Region => "region",
            ControlRole::Subregion => "branch",
            ControlRole::Category => "type",
        }
    }

    fn title(role: ControlRole) -> &'static str {
        match role {
            ControlRole::Region => "지역 선택",
            ControlRole::Subregion => "지사 선택",
            ControlRole::Category => "참여유형 선택",
        }
    }

    fn results_context(&self) -> &ContextId {
        self.results_context.as_ref().unwrap_or(&self.context)
    }

    fn has_select(&self, role: ControlRole) -> bool {
        self.order.contains(&role)
    }

    fn has_label_element(&self, role: ControlRole) -> bool {
        self.has_select(role) && self.custom_widget != Some(role) && self.labels.contains_key(&role)
    }

    fn decoys_in(&self, context: &ContextId) -> usize {
        self.decoys
            .iter()
            .filter(|(c, _)| c == context)
            .map(|(_, n)| *n)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeNode {
    Select(ControlRole),
    Widget(ControlRole),
    Option(ControlRole, usize),
    Label(ControlRole),
    Submit,
    Next,
    LayoutTable,
    ResultsTable,
    Decoy(usize),
}

impl FakeNode {
    fn key(&self) -> String {
        match self {
            FakeNode::Select(role) => format!("select:{}", role),
            FakeNode::Widget(role) => format!("widget:{}", role),
            FakeNode::Option(role, i) => format!("option:{}:{}", role, i),
            FakeNode::Label(role) => format!("label:{}", role),
            FakeNode::Submit => "submit".to_string(),
            FakeNode::Next => "next".to_string(),
            FakeNode::LayoutTable => "table:layout".to_string(),
            FakeNode::ResultsTable => "table:results".to_string(),
            FakeNode::Decoy(i) => format!("decoy:{}", i),
        }
    }

    fn parse(key: &str) -> Option<(u64, FakeNode)> {
        let (generation, rest) = key.split_once(':')?;
        let generation = generation.strip_prefix('g')?.parse().ok()?;
        let parts: Vec<&str> = rest.split(':').collect();
        let role = |s: &str| ControlRole::CASCADE.into_iter().find(|r| r.as_str() == s);
        let node = match parts.as_slice() {
            ["select", r] => FakeNode::Select(role(*r)?),
            ["widget", r] => FakeNode::Widget(role(*r)?),
            ["option", r, i] => FakeNode::Option(role(*r)?, i.parse().ok()?),
            ["label", r] => FakeNode::Label(role(*r)?),
            ["submit"] => FakeNode::Submit,
            ["next"] => FakeNode::Next,
            ["table", "layout"] => FakeNode::LayoutTable,
            ["table", "results"] => FakeNode::ResultsTable,
            ["decoy", i] => FakeNode::Decoy(i.parse().ok()?),
            _ => return None,
        };
        Some((generation, node))
    }

    fn role(&self) -> Option<ControlRole> {
        match self {
            FakeNode::Select(role) | FakeNode::Widget(role) => Some(*role),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct FakeState {
    generation: u64,
    churn_pending: bool,
    fail_contexts: bool,
    selected: HashMap<ControlRole, String>,
    pending_reads: usize,
    categories: Vec<String>,
    searches: usize,
    search_log: Vec<SelectionCombination>,
    attempts: Vec<(ControlRole, String)>,
    fallbacks: usize,
    shown: Option<Vec<Vec<ExtractedRecord>>>,
    page: usize,
    submit_present: bool,
}

pub struct FakeHost {
    form: FakeForm,
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new(form: FakeForm) -> Self {
        let state = FakeState {
            generation: 0,
            churn_pending: false,
            fail_contexts: false,
            selected: HashMap::new(),
            pending_reads: 0,
            categories: form.categories.clone(),
            searches: 0,
            search_log: Vec::new(),
            attempts: Vec::new(),
            fallbacks: 0,
            shown: form.static_pages.clone(),
            page: 0,
            submit_present: form.remove_submit_after != Some(0),
        };
        Self {
            form,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn fail_context_enumeration(&self, fail: bool) {
        self.state().fail_contexts = fail;
    }

    /// Re-renders the page: every handle issued so far goes stale.
    pub fn churn(&self) {
        self.state().generation += 1;
    }

    /// The next node access finds its node replaced.
    pub fn churn_on_next_access(&self) {
        self.state().churn_pending = true;
    }

    pub fn role_of(&self, node: &NodeHandle) -> Option<ControlRole> {
        FakeNode::parse(&node.key).and_then(|(_, n)| n.role())
    }

    pub fn selected(&self, role: ControlRole) -> Option<String> {
        self.state().selected.get(&role).cloned()
    }

    pub fn fallback_selections(&self) -> usize {
        self.state().fallbacks
    }

    pub fn searches(&self) -> usize {
        self.state().searches
    }

    pub fn search_log(&self) -> Vec<SelectionCombination> {
        self.state().search_log.clone()
    }

    /// Every label a selection was attempted with on `role`, native or
    /// scripted, accepted or not.
    pub fn selection_attempts(&self, role: ControlRole) -> Vec<String> {
        self.state()
            .attempts
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, label)| label.clone())
            .collect()
    }

    fn handle(&self, state: &FakeState, context: &ContextId, node: FakeNode) -> NodeHandle {
        NodeHandle::new(
            context.clone(),
            format!("g{}:{}", state.generation, node.key()),
        )
    }

    fn known_contexts(&self) -> Vec<ContextId> {
        let mut paths = BTreeSet::new();
        paths.insert(Vec::new());
        let mut add = |path: &[usize]| {
            for depth in 1..=path.len() {
                paths.insert(path[..depth].to_vec());
            }
        };
        add(&self.form.context.0);
        add(&self.form.results_context().0);
        for (context, _) in &self.form.decoys {
            add(&context.0);
        }
        paths.into_iter().map(ContextId::frame).collect()
    }

    fn check_context(&self, context: &ContextId) -> Result<()> {
        if self.known_contexts().contains(context) {
            Ok(())
        } else {
            Err(ScrapeError::StaleNode(format!("context {} is gone", context)))
        }
    }

    fn options(&self, state: &FakeState, role: ControlRole) -> Vec<String> {
        let mut options = vec![PLACEHOLDER.to_string()];
        match role {
            ControlRole::Region => options.extend(self.form.regions.iter().cloned()),
            ControlRole::Subregion => {
                if state.pending_reads == 0 {
                    if let Some(region) = state.selected.get(&ControlRole::Region) {
                        options.extend(
                            self.form
                                .subregions
                                .get(region)
                                .cloned()
                                .unwrap_or_default(),
                        );
                    }
                }
            }
            ControlRole::Category => options.extend(state.categories.iter().cloned()),
        }
        options
    }

    fn current_page(&self, state: &FakeState) -> Vec<ExtractedRecord> {
        state
            .shown
            .as_ref()
            .and_then(|pages| pages.get(state.page))
            .cloned()
            .unwrap_or_default()
    }

    /// `Some(enabled)` when a "next" control is rendered.
    fn next_state(&self, state: &FakeState) -> Option<bool> {
        let pages = state.shown.as_ref()?;
        if state.page + 1 < pages.len() {
            Some(true)
        } else if self.form.disabled_last_next && !pages.is_empty() {
            Some(false)
        } else {
            None
        }
    }

    fn exists(&self, state: &FakeState, context: &ContextId, node: FakeNode) -> bool {
        let in_form = *context == self.form.context;
        let in_results = context == self.form.results_context();
        match node {
            FakeNode::Select(role) => in_form && self.form.has_select(role),
            FakeNode::Widget(role) => {
                in_form && self.form.has_select(role) && self.form.custom_widget == Some(role)
            }
            FakeNode::Option(role, i) => {
                in_form && self.form.has_select(role) && i < self.options(state, role).len()
            }
            FakeNode::Label(role) => in_form && self.form.has_label_element(role),
            FakeNode::Submit => in_form && state.submit_present,
            FakeNode::Next => in_results && self.next_state(state).is_some(),
            FakeNode::LayoutTable | FakeNode::ResultsTable => in_results && self.form.tables,
            FakeNode::Decoy(i) => i < self.form.decoys_in(context),
        }
    }

    /// Validates a handle, applying any pending re-render first.
    fn lookup(&self, state: &mut FakeState, handle: &NodeHandle) -> Result<FakeNode> {
        if state.churn_pending {
            state.churn_pending = false;
            state.generation += 1;
        }
        let stale = || ScrapeError::StaleNode(handle.to_string());
        let (generation, node) = FakeNode::parse(&handle.key).ok_or_else(stale)?;
        if generation != state.generation || !self.exists(state, &handle.context, node) {
            return Err(stale());
        }
        Ok(node)
    }

    /// Form controls in document order: each dropdown (custom widgets
    /// before their inner select), then decoys.
    fn comboboxes(&self, context: &ContextId, with_widgets: bool) -> Vec<FakeNode> {
        let mut nodes = Vec::new();
        if *context == self.form.context {
            for role in &self.form.order {
                if with_widgets && self.form.custom_widget == Some(*role) {
                    nodes.push(FakeNode::Widget(*role));
                }
                nodes.push(FakeNode::Select(*role));
            }
        }
        nodes.extend((0..self.form.decoys_in(context)).map(FakeNode::Decoy));
        nodes
    }

    fn context_nodes(&self, state: &FakeState, context: &ContextId, css: &str) -> Vec<FakeNode> {
        let in_form = *context == self.form.context;
        if css == "select" {
            return self.comboboxes(context, false);
        }
        if css == COMBOBOX_CSS {
            return self.comboboxes(context, true);
        }
        if css == "table" {
            return [FakeNode::LayoutTable, FakeNode::ResultsTable]
                .into_iter()
                .filter(|n| self.exists(state, context, *n))
                .collect();
        }
        if css == CLICKABLE_CSS {
            return [FakeNode::Submit, FakeNode::Next]
                .into_iter()
                .filter(|n| self.exists(state, context, *n))
                .collect();
        }
        if !in_form {
            return Vec::new();
        }
        match css {
            "label" => self
                .form
                .order
                .iter()
                .filter(|r| self.form.has_label_element(**r))
                .map(|r| FakeNode::Label(*r))
                .collect(),
            c => match parse_attribute_selector(c) {
                Some((name, value)) => self
                    .comboboxes(context, true)
                    .into_iter()
                    .filter(|n| self.attribute_of(state, *n, &name).as_deref() == Some(value.as_str()))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    fn nested_nodes(&self, state: &mut FakeState, node: FakeNode, css: &str) -> Vec<FakeNode> {
        match (node, css) {
            (FakeNode::Select(role), "option") | (FakeNode::Widget(role), "option") => {
                if role == ControlRole::Subregion
                    && state.pending_reads > 0
                    && state.selected.contains_key(&ControlRole::Region)
                {
                    state.pending_reads -= 1;
                }
                (0..self.options(state, role).len())
                    .map(|i| FakeNode::Option(role, i))
                    .collect()
            }
            (FakeNode::Widget(role), "select") => vec![FakeNode::Select(role)],
            (FakeNode::Label(role), "select") if !self.form.stable_attributes => {
                vec![FakeNode::Select(role)]
            }
            _ => Vec::new(),
        }
    }

    fn attribute_of(&self, state: &FakeState, node: FakeNode, name: &str) -> Option<String> {
        let stable = self.form.stable_attributes;
        match (node, name) {
            (FakeNode::Select(role), "id") if stable => Some(FakeForm::select_id(role)),
            (FakeNode::Select(role), "name") if stable => {
                Some(FakeForm::select_name(role).to_string())
            }
            (FakeNode::Select(role), "title") if self.form.titles => {
                Some(FakeForm::title(role).to_string())
            }
            (FakeNode::Widget(_), "role") => Some("combobox".to_string()),
            (FakeNode::Widget(role), "aria-label") => self.form.labels.get(&role).cloned(),
            (FakeNode::Label(role), "for") if stable && !self.form.sibling_labels => {
                Some(FakeForm::select_id(role))
            }
            (FakeNode::Option(role, i), "value") => self.options(state, role).get(i).cloned(),
            (FakeNode::Submit, "type") => Some("button".to_string()),
            (FakeNode::Submit, "value") if self.form.unnamed_submit => Some(SUBMIT_LABEL.to_string()),
            (FakeNode::Submit, "aria-label") if self.form.unnamed_submit => {
                Some("btnSearch".to_string())
            }
            (FakeNode::Next, "href") => Some("#".to_string()),
            (FakeNode::Next, "class") => Some(match self.next_state(state) {
                Some(false) => "next disabled".to_string(),
                _ => "next".to_string(),
            }),
            (FakeNode::Next, "aria-disabled") if self.next_state(state) == Some(false) => {
                Some("true".to_string())
            }
            (FakeNode::LayoutTable, "class") => Some("layout".to_string()),
            (FakeNode::ResultsTable, "class") => Some("list".to_string()),
            _ => None,
        }
    }

    fn accessible_name(&self, node: FakeNode) -> String {
        match node {
            FakeNode::Select(role) if self.form.custom_widget != Some(role) => self
                .form
                .labels
                .get(&role)
                .filter(|_| !self.form.sibling_labels)
                .cloned()
                .or_else(|| self.form.titles.then(|| FakeForm::title(role).to_string()))
                .unwrap_or_default(),
            FakeNode::Widget(role) => self.form.labels.get(&role).cloned().unwrap_or_default(),
            FakeNode::Submit if self.form.unnamed_submit => "btnSearch".to_string(),
            FakeNode::Submit => SUBMIT_LABEL.to_string(),
            FakeNode::Next => NEXT_LABEL.to_string(),
            _ => String::new(),
        }
    }

    fn text_of(&self, state: &FakeState, node: FakeNode) -> String {
        match node {
            FakeNode::Option(role, i) => self.options(state, role).get(i).cloned().unwrap_or_default(),
            FakeNode::Select(role) | FakeNode::Widget(role) => self.options(state, role).join(" "),
            FakeNode::Label(role) => self.form.labels.get(&role).cloned().unwrap_or_default(),
            FakeNode::Submit if self.form.unnamed_submit => String::new(),
            FakeNode::Submit => SUBMIT_LABEL.to_string(),
            FakeNode::Next => NEXT_LABEL.to_string(),
            FakeNode::LayoutTable => "메뉴 로그인".to_string(),
            FakeNode::ResultsTable => RESULT_HEADERS.join(" "),
            FakeNode::Decoy(_) => String::new(),
        }
    }

    fn html_of(&self, state: &FakeState, node: FakeNode) -> String {
        match node {
            FakeNode::LayoutTable => {
                "<table class=\"layout\"><tr><td>메뉴</td><td>로그인</td></tr></table>".to_string()
            }
            FakeNode::ResultsTable => {
                let mut html = String::from("<table class=\"list\"><thead><tr>");
                for header in RESULT_HEADERS {
                    html.push_str(&format!("<th>{}</th>", header));
                }
                html.push_str("</tr></thead><tbody>");
                let rows = self.current_page(state);
                if rows.is_empty() {
                    html.push_str("<tr><td colspan=\"5\">검색된 결과가 없습니다.</td></tr>");
                }
                for row in rows {
                    html.push_str("<tr>");
                    for cell in [
                        &row.no,
                        &row.entity_name,
                        &row.application_type,
                        &row.address,
                        &row.category,
                    ] {
                        html.push_str(&format!("<td>{}</td>", escape(cell)));
                    }
                    html.push_str("</tr>");
                }
                html.push_str("</tbody></table>");
                html
            }
            other => format!("<span>{}</span>", escape(&self.text_of(state, other))),
        }
    }

    fn apply_selection(&self, state: &mut FakeState, role: ControlRole, label: &str) -> bool {
        let label = label.trim();
        state.attempts.push((role, label.to_string()));
        let offered = self
            .options(state, role)
            .iter()
            .skip(1)
            .any(|o| o == label);
        if !offered {
            return false;
        }

        state.selected.insert(role, label.to_string());
        if role == ControlRole::Region {
            state.selected.remove(&ControlRole::Subregion);
            state.selected.remove(&ControlRole::Category);
            state.pending_reads = self.form.population_delay;
            state.generation += 1;
        }
        true
    }

    fn search(&self, state: &mut FakeState) {
        let selected = |role: ControlRole| state.selected.get(&role).cloned().unwrap_or_default();
        let combination = SelectionCombination::new(
            selected(ControlRole::Region),
            selected(ControlRole::Subregion),
            selected(ControlRole::Category),
        );

        state.shown = match &self.form.static_pages {
            Some(pages) => Some(pages.clone()),
            None => Some(
                self.form
                    .results
                    .get(&combination)
                    .cloned()
                    .unwrap_or_else(|| vec![Vec::new()]),
            ),
        };
        state.page = 0;
        state.search_log.push(combination);
        state.searches += 1;
        state.generation += 1;

        if state.searches == 1 {
            if let Some(categories) = &self.form.categories_after_first_search {
                state.categories = categories.clone();
            }
        }
        if let Some(limit) = self.form.remove_submit_after {
            if state.searches >= limit {
                state.submit_present = false;
            }
        }
    }
}

fn parse_attribute_selector(css: &str) -> Option<(String, String)> {
    let inner = css.strip_prefix('[')?.strip_suffix(']')?;
    let (name, value) = inner.split_once('=')?;
    let value = value.strip_prefix('"')?.strip_suffix('"')?;
    Some((
        name.to_string(),
        value.replace("\\\"", "\"").replace("\\\\", "\\"),
    ))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl FormHost for FakeHost {
    async fn contexts(&self) -> Result<Vec<ContextId>> {
        if self.state().fail_contexts {
            return Err(ScrapeError::JavaScriptFailed(
                "frame enumeration blocked".to_string(),
            ));
        }
        Ok(self.known_contexts())
    }

    async fn query_by_role(
        &self,
        context: &ContextId,
        role: AriaRole,
        name: &str,
    ) -> Result<Vec<NodeHandle>> {
        self.check_context(context)?;
        let state = self.state();
        let candidates = match role {
            AriaRole::Combobox => self.comboboxes(context, true),
            AriaRole::Button => vec![FakeNode::Submit],
            AriaRole::Link => vec![FakeNode::Next],
        };
        Ok(candidates
            .into_iter()
            .filter(|n| self.exists(&state, context, *n))
            .filter(|n| self.accessible_name(*n) == name)
            .map(|n| self.handle(&state, context, n))
            .collect())
    }

    async fn query_all(&self, scope: Scope<'_>, css: &str) -> Result<Vec<NodeHandle>> {
        let mut state = self.state();
        let (context, nodes) = match scope {
            Scope::Context(context) => {
                self.check_context(context)?;
                (context, self.context_nodes(&state, context, css))
            }
            Scope::Node(handle) => {
                let node = self.lookup(&mut state, handle)?;
                (&handle.context, self.nested_nodes(&mut state, node, css))
            }
        };
        Ok(nodes
            .into_iter()
            .map(|n| self.handle(&state, context, n))
            .collect())
    }

    async fn next_sibling(&self, node: &NodeHandle, css: &str) -> Result<Option<NodeHandle>> {
        let mut state = self.state();
        let found = self.lookup(&mut state, node)?;
        let sibling = match (found, css) {
            (FakeNode::Label(role), "select") if self.form.stable_attributes => {
                Some(FakeNode::Select(role))
            }
            _ => None,
        };
        Ok(sibling.map(|n| self.handle(&state, &node.context, n)))
    }

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>> {
        let mut state = self.state();
        let found = self.lookup(&mut state, node)?;
        Ok(self.attribute_of(&state, found, name))
    }

    async fn text(&self, node: &NodeHandle) -> Result<String> {
        let mut state = self.state();
        let found = self.lookup(&mut state, node)?;
        Ok(self.text_of(&state, found))
    }

    async fn outer_html(&self, node: &NodeHandle) -> Result<String> {
        let mut state = self.state();
        let found = self.lookup(&mut state, node)?;
        Ok(self.html_of(&state, found))
    }

    async fn wait_for_state(
        &self,
        node: &NodeHandle,
        _state: ElementState,
        _timeout: Duration,
    ) -> Result<()> {
        let mut state = self.state();
        self.lookup(&mut state, node).map(|_| ())
    }

    async fn click(&self, node: &NodeHandle) -> Result<()> {
        let mut state = self.state();
        match self.lookup(&mut state, node)? {
            FakeNode::Submit => self.search(&mut state),
            FakeNode::Next => {
                if self.next_state(&state) == Some(true) {
                    state.page += 1;
                    state.generation += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn select_by_label(&self, node: &NodeHandle, label: &str) -> Result<()> {
        let mut state = self.state();
        match self.lookup(&mut state, node)? {
            FakeNode::Select(role) if self.form.custom_widget == Some(role) => {
                state.attempts.push((role, label.trim().to_string()));
                Err(ScrapeError::ElementNotFound(format!("{} is disabled", node)))
            }
            FakeNode::Select(role) => {
                if self.apply_selection(&mut state, role, label) {
                    Ok(())
                } else {
                    Err(ScrapeError::ElementNotFound(format!(
                        "no option '{}' on {}",
                        label, node
                    )))
                }
            }
            _ => Err(ScrapeError::ElementNotFound(format!("{} is not a select", node))),
        }
    }

    async fn evaluate(&self, node: &NodeHandle, function: &str, args: Value) -> Result<Value> {
        let mut state = self.state();
        let found = self.lookup(&mut state, node)?;
        if function != SELECT_OPTION_FALLBACK {
            return Err(ScrapeError::JavaScriptFailed(
                "unsupported script".to_string(),
            ));
        }

        let label = args.get("label").and_then(Value::as_str).unwrap_or_default();
        let applied = match found.role() {
            Some(role) => self.apply_selection(&mut state, role, label),
            None => false,
        };
        if applied {
            state.fallbacks += 1;
        }
        Ok(Value::Bool(applied))
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}
