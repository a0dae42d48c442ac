//! Query Execution Module
//!
//! The seam between the gatekeeper and the engine:
//! - [`QueryExecutor`]: runs one query, returns a tagged result
//! - [`ExecutionContext`]: diagnostic flags and deadline threaded into the call
//! - [`run_guarded`]: turns an engine panic into [`ExecutionError::Internal`]
//! - [`QueryTimeout`]: a deadline the executor checks cooperatively

mod message;
mod remote;
mod timeout;

pub use message::user_friendly_message;
pub use remote::RemoteExecutor;
pub use timeout::{QueryTimeout, TimeoutError};

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::auth::AccessDenied;
use crate::model::{QueryRequest, QueryResponse};

/// Execution error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The engine refused the caller
    #[error("Access is denied: {0}")]
    AccessDenied(String),

    /// Query timed out
    #[error("Query timeout: {0}")]
    Timeout(#[from] TimeoutError),

    /// The engine rejected or failed the query
    #[error("{0}")]
    Query(String),

    /// Engine-internal failure, including assertion panics
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Whether the failure may be replayed to other callers from the
    /// exception region. Denials are per caller; timeouts depend on load.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, ExecutionError::Query(_) | ExecutionError::Internal(_))
    }
}

impl From<AccessDenied> for ExecutionError {
    fn from(err: AccessDenied) -> Self {
        ExecutionError::AccessDenied(err.0)
    }
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Per-call inputs that are not part of the cache identity.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub diagnostics: BTreeMap<String, String>,
    pub timeout: QueryTimeout,
}

impl ExecutionContext {
    pub fn new(diagnostics: BTreeMap<String, String>, timeout: QueryTimeout) -> Self {
        Self {
            diagnostics,
            timeout,
        }
    }
}

/// Runs queries against the engine. Implementations may block.
pub trait QueryExecutor: Send + Sync {
    fn run_query(
        &self,
        request: &QueryRequest,
        ctx: &ExecutionContext,
    ) -> ExecutionResult<QueryResponse>;
}

/// Call `executor`, converting a panic into [`ExecutionError::Internal`].
pub fn run_guarded(
    executor: &dyn QueryExecutor,
    request: &QueryRequest,
    ctx: &ExecutionContext,
) -> ExecutionResult<QueryResponse> {
    catch_unwind(AssertUnwindSafe(|| executor.run_query(request, ctx)))
        .unwrap_or_else(|payload| Err(ExecutionError::Internal(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "engine panicked".to_string()
    }
}
