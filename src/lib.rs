//! # QueryGate
//!
//! A query gatekeeper for an analytical SQL engine. Sits between callers
//! and the engine, decides whether a request may run, reuses cached results
//! and cached failures, and re-checks access against the data source that
//! actually answered.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Caller + QueryRequest
//!     ↓
//! [Diagnostics]      → per-request flags scoped for the call
//!     ↓
//! [Admission]        → serving mode, select-only gate
//!     ↓
//! [Cache Lookup]     → ExceptionQueryCache, then SuccessQueryCache
//!     ↓ (miss)
//! [QueryExecutor]    → engine call, panics caught, failures classified
//!     ↓
//! [Cache Admission]  → slow or scan-heavy results only
//!     ↓
//! [Authorizer]       → caller vs the realization that answered
//!     ↓
//! [Query Log]        → one record per call
//!     ↓
//! QueryResponse | QueryError
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use querygate::{
//!     AllowAll, Caller, Config, QueryCaches, QueryGatekeeper, QueryRequest,
//!     Role, SharedConfig, TracingQueryLog,
//! };
//!
//! let config = Arc::new(SharedConfig::new(Config::load()?));
//! let gatekeeper = QueryGatekeeper::new(
//!     config,
//!     QueryCaches::default(),
//!     Arc::new(my_engine),
//!     Arc::new(AllowAll),
//!     Arc::new(TracingQueryLog),
//! );
//!
//! let caller = Caller::new("alice", vec![Role::Analyst]);
//! let response = gatekeeper.execute(&caller, &QueryRequest::new("select 1", "sales"))?;
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod execution;
pub mod export;
pub mod gatekeeper;
pub mod logging;
pub mod model;
pub mod query_log;
pub mod rest;

pub use auth::{AccessDenied, AclAuthorizer, AllowAll, Authorizer, Caller, Role};
pub use cache::{CacheRegion, CacheStats, MemoryRegion, QueryCaches};
pub use config::{Config, ConfigSource, ServerMode, SharedConfig};
pub use diagnostics::DiagnosticContext;
pub use error::{FailureKind, QueryError};
pub use execution::{
    ExecutionContext, ExecutionError, ExecutionResult, QueryExecutor, QueryTimeout,
    RemoteExecutor,
};
pub use gatekeeper::{GateStats, QueryGatekeeper};
pub use model::{CacheKey, ColumnMeta, QueryRequest, QueryResponse};
pub use query_log::{AsyncQueryLog, QueryLogRecord, QueryLogger, TracingQueryLog};
