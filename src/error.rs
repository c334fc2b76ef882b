//! Error types.
//!
//! Two layers:
//!
//! - `PipelineError` carries an `ErrorKind` and is what ingestion and analytics
//!   record per series / per statistic.
//! - `AppError` is the binary-facing error: a message plus the process exit code.

use serde::{Deserialize, Serialize};

/// Failure classes surfaced to callers and recorded in run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Upstream API unreachable, non-success status, or malformed payload.
    #[serde(rename = "upstream_error")]
    Upstream,
    /// Object store unreachable or permission denied.
    StorageUnavailable,
    /// A stored numeric field (or a stored document) could not be parsed.
    MalformedValue,
    /// An aggregation had no rows to operate on.
    InsufficientData,
    /// The run's wall-clock budget ran out before this unit of work started.
    BudgetExhausted,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "upstream_error",
            Self::StorageUnavailable => "storage_unavailable",
            Self::MalformedValue => "malformed_value",
            Self::InsufficientData => "insufficient_data",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageUnavailable, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedValue, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientData, message)
    }

    pub fn budget(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExhausted, message)
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let exit_code = match err.kind {
            ErrorKind::StorageUnavailable => 2,
            _ => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}
