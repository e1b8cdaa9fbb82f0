//! Error types for E2E verification

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// One field whose observed value differs from the snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMismatch {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.field, self.expected, self.actual)
    }
}

/// Renders a mismatch list as `a: expected x, got y; b: ...`
fn join_mismatches(mismatches: &[FieldMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn or_none(detail: &Option<String>) -> &str {
    detail.as_deref().unwrap_or("none")
}

fn status_text(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no response".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("{context}: request unsuccessful (status: {}) - {detail}", status_text(.status))]
    TransportFailure {
        context: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("{context}: {}", join_mismatches(.mismatches))]
    VerificationMismatch {
        context: String,
        mismatches: Vec<FieldMismatch>,
    },

    #[error("Resource was not created: {detail}")]
    CreationFailure { detail: String },

    #[error("Resource {id} not found")]
    ResourceNotFound { id: u64 },

    #[error("Timed out after {elapsed:?} waiting for: {condition} (last error: {})", or_none(.last_error))]
    TimeoutExceeded {
        condition: String,
        elapsed: Duration,
        last_error: Option<String>,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("WebDriver failed to start: {0}")]
    DriverStartup(String),

    #[error("WebDriver health check failed after {0} attempts")]
    DriverHealthCheck(usize),

    #[error("Flow parse error: {0}")]
    FlowParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),
}

pub type E2eResult<T> = Result<T, E2eError>;
