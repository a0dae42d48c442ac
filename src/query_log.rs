//! Query audit log
//!
//! Every gatekeeper call produces one [`QueryLogRecord`]. Records are handed
//! to a [`QueryLogger`]; [`AsyncQueryLog`] pushes them through a bounded
//! channel to a background thread so logging never blocks a response.

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Sender, TrySendError};
use std::fmt;
use std::thread;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Caller;
use crate::model::{QueryRequest, QueryResponse};

/// Summary of one served query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLogRecord {
    pub query_id: Uuid,
    pub sql: String,
    pub user: String,
    pub project: String,
    pub success: bool,
    pub duration_ms: u64,
    pub realization: Option<String>,
    pub total_scan_count: u64,
    pub result_row_count: usize,
    pub accept_partial: bool,
    pub is_partial: bool,
    pub hit_cache: bool,
    pub message: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryLogRecord {
    pub fn new(
        request: &QueryRequest,
        caller: &Caller,
        response: &QueryResponse,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            sql: request.sql.clone(),
            user: caller.username.clone(),
            project: request.project.clone(),
            success: !response.is_exception,
            duration_ms: response.duration,
            realization: response.cube.clone(),
            total_scan_count: response.total_scan_count,
            result_row_count: response.row_count(),
            accept_partial: request.accept_partial,
            is_partial: response.is_partial,
            hit_cache: response.hit_cache,
            message: response.exception_message.clone(),
            start,
            end,
        }
    }
}

impl fmt::Display for QueryLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str = "==========================[QUERY]===============================";
        writeln!(f, "{RULE}")?;
        writeln!(f, "Query Id: {}", self.query_id)?;
        writeln!(f, "SQL: {}", self.sql)?;
        writeln!(f, "User: {}", self.user)?;
        writeln!(f, "Success: {}", self.success)?;
        writeln!(f, "Duration: {:.3}", self.duration_ms as f64 / 1000.0)?;
        writeln!(f, "Project: {}", self.project)?;
        writeln!(
            f,
            "Realization Names: [{}]",
            self.realization.as_deref().unwrap_or_default()
        )?;
        writeln!(f, "Total scan count: {}", self.total_scan_count)?;
        writeln!(f, "Result row count: {}", self.result_row_count)?;
        writeln!(f, "Accept Partial: {}", self.accept_partial)?;
        writeln!(f, "Is Partial Result: {}", self.is_partial)?;
        writeln!(f, "Hit Cache: {}", self.hit_cache)?;
        writeln!(f, "Start: {}", self.start.to_rfc3339())?;
        writeln!(f, "End: {}", self.end.to_rfc3339())?;
        writeln!(
            f,
            "Message: {}",
            self.message.as_deref().unwrap_or_default()
        )?;
        write!(f, "{RULE}")
    }
}

/// Receives one record per gatekeeper call. Must not block or fail the caller.
pub trait QueryLogger: Send + Sync {
    fn log_query(
        &self,
        request: &QueryRequest,
        caller: &Caller,
        response: &QueryResponse,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    );
}

fn emit(record: &QueryLogRecord) {
    info!(
        target: "querygate::query_log",
        query_id = %record.query_id,
        user = %record.user,
        project = %record.project,
        success = record.success,
        duration_ms = record.duration_ms,
        hit_cache = record.hit_cache,
        "\n{record}"
    );
}

/// Logs synchronously through `tracing` on the calling thread.
pub struct TracingQueryLog;

impl QueryLogger for TracingQueryLog {
    fn log_query(
        &self,
        request: &QueryRequest,
        caller: &Caller,
        response: &QueryResponse,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        emit(&QueryLogRecord::new(request, caller, response, start, end));
    }
}

/// Background query log writer.
///
/// When the channel is full the record is dropped with a warning.
pub struct AsyncQueryLog {
    sender: Sender<QueryLogRecord>,
}

impl AsyncQueryLog {
    /// Writer that emits records through `tracing`.
    pub fn new(capacity: usize) -> std::io::Result<Self> {
        Self::with_sink(capacity, |record| emit(&record))
    }

    /// Writer that hands every record to `sink` on the background thread.
    pub fn with_sink<F>(capacity: usize, sink: F) -> std::io::Result<Self>
    where
        F: Fn(QueryLogRecord) + Send + 'static,
    {
        let (sender, receiver) = bounded::<QueryLogRecord>(capacity.max(1));
        thread::Builder::new()
            .name("query-log".to_string())
            .spawn(move || {
                for record in receiver {
                    sink(record);
                }
            })?;
        Ok(Self { sender })
    }
}

impl QueryLogger for AsyncQueryLog {
    fn log_query(
        &self,
        request: &QueryRequest,
        caller: &Caller,
        response: &QueryResponse,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        let record = QueryLogRecord::new(request, caller, response, start, end);
        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                warn!(query_id = %record.query_id, "query_log_full_record_dropped");
            }
            Err(TrySendError::Disconnected(record)) => {
                warn!(query_id = %record.query_id, "query_log_writer_gone");
            }
        }
    }
}
