use crate::errors::{Result, ScrapeError};
use crate::types::{ControlRole, SelectionCombination};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub seed: SeedConfig,
    pub timing: TimingConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub locale: Option<String>,
    pub args: Vec<String>,
    pub navigation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Label synonyms and attribute keywords that identify one control role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleLabels {
    /// Exact accessible names, tried in order.
    pub labels: Vec<String>,
    /// Substrings looked for in `title` / `aria-label`.
    pub keywords: Vec<String>,
}

/// Site knowledge: everything about the target form that is not logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub url: String,
    /// Closed list of valid region names; also the outer sweep order.
    pub regions: Vec<String>,
    /// Closed list of valid category names, used for content signatures.
    pub categories: Vec<String>,
    pub region: RoleLabels,
    pub subregion: RoleLabels,
    pub category: RoleLabels,
    pub placeholder_labels: Vec<String>,
    /// Submit button labels, primary first.
    pub submit_labels: Vec<String>,
    pub next_page_labels: Vec<String>,
    pub header_keywords: Vec<String>,
    pub table_scan_limit: usize,
    /// Pages walked per combination; `None` walks until the pager runs out.
    pub page_cap: Option<usize>,
    /// Explicit combinations to visit instead of the full sweep.
    pub targets: Vec<SelectionCombination>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub option_poll_ms: u64,
    pub option_timeout_ms: u64,
    pub region_settle_ms: u64,
    pub subregion_settle_ms: u64,
    pub category_settle_ms: u64,
    pub search_settle_ms: u64,
    pub page_settle_ms: u64,
    pub network_idle_ms: u64,
    pub network_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.seed.url).map_err(|e| {
            ScrapeError::ConfigurationError(format!("invalid url '{}': {}", self.seed.url, e))
        })?;

        if self.seed.regions.is_empty() && self.seed.targets.is_empty() {
            return Err(ScrapeError::ConfigurationError(
                "no regions or targets configured".to_string(),
            ));
        }

        if self.seed.submit_labels.is_empty() {
            return Err(ScrapeError::ConfigurationError(
                "at least one submit label is required".to_string(),
            ));
        }

        if self.seed.page_cap == Some(0) {
            return Err(ScrapeError::ConfigurationError(
                "page_cap must be at least 1".to_string(),
            ));
        }

        if self.timing.option_poll_ms == 0 {
            return Err(ScrapeError::ConfigurationError(
                "option_poll_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl SeedConfig {
    pub fn labels_for(&self, role: ControlRole) -> &RoleLabels {
        match role {
            ControlRole::Region => &self.region,
            ControlRole::Subregion => &self.subregion,
            ControlRole::Category => &self.category,
        }
    }
}

impl TimingConfig {
    /// No settle pauses and short polls; for in-memory hosts.
    pub fn immediate() -> Self {
        Self {
            option_poll_ms: 5,
            option_timeout_ms: 200,
            region_settle_ms: 0,
            subregion_settle_ms: 0,
            category_settle_ms: 0,
            search_settle_ms: 0,
            page_settle_ms: 0,
            network_idle_ms: 0,
            network_timeout_ms: 200,
        }
    }

    pub fn option_poll(&self) -> Duration {
        Duration::from_millis(self.option_poll_ms)
    }

    pub fn option_timeout(&self) -> Duration {
        Duration::from_millis(self.option_timeout_ms)
    }

    pub fn settle_after(&self, role: ControlRole) -> Duration {
        Duration::from_millis(match role {
            ControlRole::Region => self.region_settle_ms,
            ControlRole::Subregion => self.subregion_settle_ms,
            ControlRole::Category => self.category_settle_ms,
        })
    }

    pub fn search_settle(&self) -> Duration {
        Duration::from_millis(self.search_settle_ms)
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            locale: Some("ko-KR".to_string()),
            args: vec![],
            navigation_timeout_ms: 120_000,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            url: "https://pdms.ncs.go.kr/cmn/pub/opr/retrieveOprLrnEntrprList.do".to_string(),
            regions: strings(&[
                "서울", "부산", "대구", "인천", "광주", "대전", "울산", "세종", "경기", "강원",
                "충북", "충남", "전북", "전남", "경북", "경남", "제주",
            ]),
            categories: strings(&["공동훈련센터형", "단독기업형"]),
            region: RoleLabels {
                labels: strings(&["지역"]),
                keywords: strings(&["지역", "region"]),
            },
            subregion: RoleLabels {
                labels: strings(&["지사"]),
                keywords: strings(&["지사", "branch"]),
            },
            category: RoleLabels {
                labels: strings(&["참여유형", "참여유형명"]),
                keywords: strings(&["참여유형", "type"]),
            },
            placeholder_labels: strings(&["선택", "전체", "select", "all"]),
            submit_labels: strings(&["검색", "조회"]),
            next_page_labels: strings(&["다음", "다음 페이지", "next"]),
            header_keywords: strings(&["학습기업", "기업명", "신청유형", "주소", "종목"]),
            table_scan_limit: 30,
            page_cap: None,
            targets: vec![],
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            option_poll_ms: 200,
            option_timeout_ms: 10_000,
            region_settle_ms: 400,
            subregion_settle_ms: 300,
            category_settle_ms: 200,
            search_settle_ms: 600,
            page_settle_ms: 400,
            network_idle_ms: 500,
            network_timeout_ms: 30_000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("records.csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seed.page_cap, None);
        assert_eq!(config.timing.option_timeout(), Duration::from_secs(10));
        assert_eq!(config.seed.category.labels, vec!["참여유형", "참여유형명"]);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"seed": {{"url": "https://example.org/form", "regions": ["A"], "page_cap": 5}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.seed.regions, vec!["A"]);
        assert_eq!(config.seed.page_cap, Some(5));
        assert_eq!(config.seed.table_scan_limit, 30);
        assert_eq!(config.timing.option_poll_ms, 200);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let mut config = Config::default();
        config.seed.url = "not a url".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ScrapeError::ConfigurationError(_)));
    }

    #[test]
    fn test_zero_page_cap_is_rejected() {
        let mut config = Config::default();
        config.seed.page_cap = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_targets_replace_regions() {
        let mut config = Config::default();
        config.seed.regions.clear();
        assert!(config.validate().is_err());
        config
            .seed
            .targets
            .push(SelectionCombination::new("서울", "서울강남", "공동훈련센터형"));
        assert!(config.validate().is_ok());
    }
}
