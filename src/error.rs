//! User-facing query error

use serde::Serialize;
use std::fmt;

/// Why a query was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The serving mode does not admit queries
    ModeRejected,
    /// The SQL text failed the select-keyword gate
    UnsupportedSql,
    /// The caller may not see the result
    AccessDenied,
    /// The execution deadline passed
    Timeout,
    /// The engine failed, freshly or from the exception cache
    Execution,
}

impl FailureKind {
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::ModeRejected => "MODE_REJECTED",
            FailureKind::UnsupportedSql => "UNSUPPORTED_SQL",
            FailureKind::AccessDenied => "ACCESS_DENIED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::Execution => "EXECUTION_ERROR",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The single error type the gatekeeper surfaces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct QueryError {
    pub kind: FailureKind,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
