use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Form controls not found: {0}")]
    ControlsNotFound(String),

    #[error("Options not loaded: {0}")]
    OptionsNotLoaded(String),

    #[error("Submit control not found: {0}")]
    SubmitControlNotFound(String),

    #[error("Selection rejected: {0}")]
    SelectionRejected(String),

    #[error("Result table not found: {0}")]
    TableNotFound(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Tab creation failed: {0}")]
    TabCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Stale node reference: {0}")]
    StaleNode(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    AnyhowError(String),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        ScrapeError::AnyhowError(err.to_string())
    }
}

impl ScrapeError {
    /// Fatal errors end the whole sweep; everything else only abandons the
    /// combination being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScrapeError::ControlsNotFound(_)
                | ScrapeError::SubmitControlNotFound(_)
                | ScrapeError::LaunchFailed(_)
                | ScrapeError::BrowserNotLaunched
                | ScrapeError::TabCreationFailed(_)
                | ScrapeError::ConfigurationError(_)
        )
    }

    /// Short machine-friendly tag used in skip reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::ControlsNotFound(_) => "controls_not_found",
            ScrapeError::OptionsNotLoaded(_) => "options_not_loaded",
            ScrapeError::SubmitControlNotFound(_) => "submit_control_not_found",
            ScrapeError::SelectionRejected(_) => "selection_rejected",
            ScrapeError::TableNotFound(_) => "table_not_found",
            ScrapeError::LaunchFailed(_) => "launch_failed",
            ScrapeError::BrowserNotLaunched => "browser_not_launched",
            ScrapeError::TabCreationFailed(_) => "tab_creation_failed",
            ScrapeError::NavigationFailed(_) => "navigation_failed",
            ScrapeError::ElementNotFound(_) => "element_not_found",
            ScrapeError::StaleNode(_) => "stale_node",
            ScrapeError::JavaScriptFailed(_) => "javascript_failed",
            ScrapeError::TimeoutError(_) => "timeout",
            ScrapeError::ConfigurationError(_) => "configuration",
            ScrapeError::SerializationError(_) => "serialization",
            ScrapeError::CsvError(_) => "csv",
            ScrapeError::IoError(_) => "io",
            ScrapeError::AnyhowError(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ScrapeError::ControlsNotFound("x".into()).is_fatal());
        assert!(ScrapeError::SubmitControlNotFound("x".into()).is_fatal());
        assert!(!ScrapeError::OptionsNotLoaded("x".into()).is_fatal());
        assert!(!ScrapeError::SelectionRejected("x".into()).is_fatal());
        assert!(!ScrapeError::TableNotFound("x".into()).is_fatal());
        assert!(!ScrapeError::StaleNode("x".into()).is_fatal());
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: ScrapeError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), "other");
        assert_eq!(err.to_string(), "Anyhow error: boom");
    }
}
