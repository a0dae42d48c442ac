//! Query request/response model
//!
//! [`QueryRequest`] is what the caller sends, [`QueryResponse`] is what the
//! engine (or a cache region) hands back. Cache regions are keyed by
//! [`CacheKey`], a projection of the request that leaves out diagnostic
//! entries so two otherwise identical queries share one cache slot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inbound query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql: String,

    /// Project (namespace) the query runs against
    pub project: String,

    #[serde(default)]
    pub offset: u64,

    /// Maximum rows to return (0 = engine default)
    #[serde(default)]
    pub limit: u64,

    /// Accept a partial result when the engine caps the scan
    #[serde(default = "default_accept_partial")]
    pub accept_partial: bool,

    /// Request-scoped diagnostic flags consulted by the engine
    #[serde(default, alias = "backdoorToggles")]
    pub diagnostics: BTreeMap<String, String>,
}

fn default_accept_partial() -> bool {
    true
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            project: project.into(),
            offset: 0,
            limit: 0,
            accept_partial: true,
            diagnostics: BTreeMap::new(),
        }
    }

    pub fn with_diagnostic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.diagnostics.insert(key.into(), value.into());
        self
    }

    pub fn with_limit(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Cache identity: every field that can change the result, nothing else.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            sql: self.sql.clone(),
            project: self.project.clone(),
            offset: self.offset,
            limit: self.limit,
            accept_partial: self.accept_partial,
        }
    }
}

/// Result-affecting projection of a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sql: String,
    pub project: String,
    pub offset: u64,
    pub limit: u64,
    pub accept_partial: bool,
}

/// Result column description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub label: String,
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub table_name: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnMeta {
    pub fn new(label: impl Into<String>, type_name: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            name: label.clone(),
            label,
            type_name: type_name.into(),
            table_name: String::new(),
            nullable: true,
        }
    }
}

/// Outcome of a query, fresh or cached.
///
/// `is_exception == true` means no rows, no columns and a non-empty
/// `exception_message`; otherwise `cube` names the realization that
/// produced the rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub column_metas: Vec<ColumnMeta>,

    #[serde(default)]
    pub results: Vec<Vec<Option<String>>>,

    /// Realization (cube or table) that answered the query
    #[serde(default)]
    pub cube: Option<String>,

    #[serde(default)]
    pub affected_row_count: u64,

    #[serde(default)]
    pub is_exception: bool,

    #[serde(default)]
    pub exception_message: Option<String>,

    /// Wall-clock milliseconds spent serving the request
    #[serde(default)]
    pub duration: u64,

    #[serde(default)]
    pub total_scan_count: u64,

    #[serde(default)]
    pub is_partial: bool,

    /// Served from a cache region rather than a fresh execution
    #[serde(default)]
    pub hit_cache: bool,
}

impl QueryResponse {
    /// Successful result produced by `cube`.
    pub fn success(
        column_metas: Vec<ColumnMeta>,
        results: Vec<Vec<Option<String>>>,
        cube: impl Into<String>,
        total_scan_count: u64,
    ) -> Self {
        Self {
            column_metas,
            results,
            cube: Some(cube.into()),
            total_scan_count,
            ..Self::default()
        }
    }

    /// Exception-flagged response. An empty message is replaced so the
    /// caller always sees something.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Unknown error".to_string();
        }
        Self {
            is_exception: true,
            exception_message: Some(message),
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.results.len()
    }

    pub fn message(&self) -> &str {
        self.exception_message.as_deref().unwrap_or_default()
    }
}
