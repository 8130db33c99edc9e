//! Error types for the extraction engine.
//!
//! Only conditions that abort an operation are errors. Per-section gaps,
//! modal timeouts and per-document download failures are reported as values
//! (see [`crate::report`]) so that sibling work continues.

use crate::types::LocatorSpec;
use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Failures reported by a rendering capability.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The element (or handle) does not exist in the current page.
    #[error("element not found: {0}")]
    NotFound(String),

    /// Script evaluation failed or returned an unusable value.
    #[error("script error: {0}")]
    Script(String),

    /// The browser session itself is broken (navigation, protocol, closed tab).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether this error only means "nothing matched".
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::NotFound(_))
    }
}

/// All errors that can abort an engine operation.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// Every locator strategy was tried once and none produced an element.
    #[error("element not found after {} strategies (last error: {})", .attempted.len(), .last_error.as_deref().unwrap_or("none"))]
    ElementNotFound {
        attempted: Vec<LocatorSpec>,
        last_error: Option<String>,
    },

    /// The CAPTCHA attempt budget was spent without a usable token.
    #[error("captcha solving exhausted after {attempts} attempts (last error: {})", .last_error.as_deref().unwrap_or("empty result"))]
    SolveExhausted {
        attempts: u32,
        last_error: Option<String>,
    },

    /// A bounded wait ran out.
    #[error("timed out after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },

    /// The caller-supplied run deadline has passed.
    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("solver error: {0}")]
    Solver(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Whether the error aborts the whole run rather than one step.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::ElementNotFound { .. }
                | HarvestError::SolveExhausted { .. }
                | HarvestError::DeadlineExceeded
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_not_found_message_lists_count() {
        let err = HarvestError::ElementNotFound {
            attempted: vec![LocatorSpec::id("cino"), LocatorSpec::name("cino")],
            last_error: Some("no node".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 strategies"));
        assert!(msg.contains("no node"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_timeout_is_not_fatal() {
        let err = HarvestError::Timeout {
            what: "overlay".to_string(),
            after: Duration::from_millis(1500),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("1500ms"));
    }
}
