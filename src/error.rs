//! Error types for a3s-audit

use thiserror::Error;

/// Errors that can occur in the audit subsystem
///
/// Only query and configuration operations surface these to callers.
/// The capture path (`log`, `enqueue`, `forward`) converts them into
/// outcomes and diagnostics instead.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Network-level failure reaching the collector
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote call exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Collector answered with a non-2xx status
    #[error("Collector returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local durable storage failure (write failed, quota, corrupt blob)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Collector refused the request without an HTTP status (fakes, envelopes)
    #[error("Rejected by collector: {0}")]
    Rejected(String),
}

impl AuditError {
    /// Whether retrying the same request can never succeed
    ///
    /// 4xx statuses are permanent except 408 (request timeout) and
    /// 429 (rate limited). Everything else is treated as transient.
    pub fn is_permanent(&self) -> bool {
        match self {
            AuditError::Status { status, .. } => {
                (400..500).contains(status) && !matches!(*status, 408 | 429)
            }
            AuditError::Serialization(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AuditError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuditError::Timeout(e.to_string())
        } else if e.is_decode() {
            AuditError::Transport(format!("invalid response body: {}", e))
        } else {
            AuditError::Transport(e.to_string())
        }
    }
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
