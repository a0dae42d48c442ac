//! Query Gatekeeper
//!
//! Decides for each request whether a previous result or error can be
//! reused, runs the engine only when it cannot, decides whether the fresh
//! outcome is worth caching, and re-checks authorization against the
//! realization that produced the answer.
//!
//! ## Pipeline
//! ```text
//! request
//!   → diagnostic scope (installed now, cleared on every exit)
//!   → admission: serving mode, select-keyword gate
//!   → cache lookup: exception region, then success region
//!   → on miss: execute (panics caught), classify, conditionally cache
//!   → post-hoc authorization (denials never cached)
//!   → log, then return the response or raise QueryError
//! ```
//!
//! Failures travel through the pipeline as exception-flagged
//! [`QueryResponse`]s so caching and logging see one shape; only the last
//! step turns them into a [`QueryError`].

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::auth::{AccessDenied, Authorizer, Caller};
use crate::cache::QueryCaches;
use crate::config::{Config, ConfigSource};
use crate::diagnostics::DiagnosticContext;
use crate::error::{FailureKind, QueryError};
use crate::execution::{
    run_guarded, user_friendly_message, ExecutionContext, ExecutionError, QueryExecutor,
    QueryTimeout,
};
use crate::model::{CacheKey, QueryRequest, QueryResponse};
use crate::query_log::QueryLogger;

/// Counters exposed by [`QueryGatekeeper::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GateStats {
    pub requests: u64,
    pub executions: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub uptime_secs: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    executions: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

/// A response plus, when it is exception-flagged, why.
struct Outcome {
    response: QueryResponse,
    kind: FailureKind,
}

impl Outcome {
    fn answered(response: QueryResponse) -> Self {
        Self {
            response,
            kind: FailureKind::Execution,
        }
    }

    fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            response: QueryResponse::failure(message),
            kind,
        }
    }
}

/// Admission, caching and authorization in front of a [`QueryExecutor`].
pub struct QueryGatekeeper {
    config: Arc<dyn ConfigSource>,
    caches: QueryCaches,
    executor: Arc<dyn QueryExecutor>,
    authorizer: Arc<dyn Authorizer>,
    logger: Arc<dyn QueryLogger>,
    diagnostics: Arc<DiagnosticContext>,
    counters: Counters,
    start_time: Instant,
}

impl QueryGatekeeper {
    /// Create a gatekeeper that scopes diagnostics in the process-wide context.
    pub fn new(
        config: Arc<dyn ConfigSource>,
        caches: QueryCaches,
        executor: Arc<dyn QueryExecutor>,
        authorizer: Arc<dyn Authorizer>,
        logger: Arc<dyn QueryLogger>,
    ) -> Self {
        Self {
            config,
            caches,
            executor,
            authorizer,
            logger,
            diagnostics: DiagnosticContext::global(),
            counters: Counters::default(),
            start_time: Instant::now(),
        }
    }

    /// Use a dedicated diagnostic context instead of the process-wide one.
    pub fn with_diagnostics(mut self, diagnostics: Arc<DiagnosticContext>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Configuration in effect right now.
    pub fn current_config(&self) -> Arc<Config> {
        self.config.current()
    }

    pub fn caches(&self) -> &QueryCaches {
        &self.caches
    }

    pub fn diagnostics(&self) -> &Arc<DiagnosticContext> {
        &self.diagnostics
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            executions: self.counters.executions.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Serve one query.
    ///
    /// Blocks for as long as the executor does. Every call is logged, and
    /// the request's diagnostic entries are gone from the shared context by
    /// the time this returns or unwinds.
    pub fn execute(
        &self,
        caller: &Caller,
        request: &QueryRequest,
    ) -> Result<QueryResponse, QueryError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let _scope = self.diagnostics.scope(&request.diagnostics);

        let started_at = Utc::now();
        let started = Instant::now();
        let config = self.config.current();

        let Outcome { mut response, kind } = self.serve(&config, caller, request);
        response.duration = millis(started.elapsed());

        self.logger
            .log_query(request, caller, &response, started_at, Utc::now());

        if response.is_exception {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            Err(QueryError::new(kind, response.message()))
        } else {
            Ok(response)
        }
    }

    fn serve(&self, config: &Config, caller: &Caller, request: &QueryRequest) -> Outcome {
        info!(project = %request.project, user = %caller.username, sql = %request.sql, "query_received");

        let mode = config.server.mode;
        if !mode.allows_query() {
            return Outcome::failed(
                FailureKind::ModeRejected,
                format!("Query is not allowed in {mode} mode."),
            );
        }

        if !request.sql.to_lowercase().contains("select") {
            debug!(sql = %request.sql, "query_rejected_not_select");
            return Outcome::failed(FailureKind::UnsupportedSql, "Not Supported SQL.");
        }

        let key = request.cache_key();
        let response = match self.lookup(config, &key) {
            Some(hit) => hit,
            None => match self.run(config, request, &key) {
                Ok(fresh) => fresh,
                Err(outcome) => return outcome,
            },
        };

        if response.is_exception {
            return Outcome::answered(response);
        }

        if config.query.secure_enabled {
            if let Err(denied) = self.authorize(caller, &response) {
                warn!(user = %caller.username, cube = ?response.cube, "query_access_denied");
                return Outcome::failed(
                    FailureKind::AccessDenied,
                    user_friendly_message(&denied.to_string()),
                );
            }
        }

        Outcome::answered(response)
    }

    /// Probe the exception region, then the success region.
    fn lookup(&self, config: &Config, key: &CacheKey) -> Option<QueryResponse> {
        if !config.query.cache_enabled {
            return None;
        }

        let mut hit = self
            .caches
            .exception
            .get(key)
            .or_else(|| self.caches.success.get(key))?;
        hit.hit_cache = true;
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        debug!(exception = hit.is_exception, "query_cache_hit");
        Some(hit)
    }

    /// Run the engine and apply the admission policy to the outcome.
    fn run(
        &self,
        config: &Config,
        request: &QueryRequest,
        key: &CacheKey,
    ) -> Result<QueryResponse, Outcome> {
        let ctx = ExecutionContext::new(
            request.diagnostics.clone(),
            QueryTimeout::from_millis(config.query.timeout_ms),
        );

        self.counters.executions.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let result = run_guarded(self.executor.as_ref(), request, &ctx);
        let elapsed = millis(started.elapsed());

        match result {
            Ok(response) if response.is_exception => {
                // Engine answered with a flagged failure instead of an error
                warn!(message = %response.message(), "query_engine_flagged_exception");
                Err(Outcome::failed(
                    FailureKind::Execution,
                    user_friendly_message(response.message()),
                ))
            }
            Ok(response) => {
                if config.query.cache_enabled
                    && worth_caching(config, elapsed, response.total_scan_count)
                {
                    debug!(elapsed_ms = elapsed, scan_count = response.total_scan_count, "query_result_cached");
                    self.caches.success.put(key.clone(), response.clone());
                }
                Ok(response)
            }
            Err(err) => Err(self.classify(config, key, &err)),
        }
    }

    /// Normalize an execution failure; cache it unless it is caller- or
    /// load-specific.
    fn classify(&self, config: &Config, key: &CacheKey, err: &ExecutionError) -> Outcome {
        error!(error = %err, "query_execution_failed");

        let kind = match err {
            ExecutionError::AccessDenied(_) => FailureKind::AccessDenied,
            ExecutionError::Timeout(_) => FailureKind::Timeout,
            ExecutionError::Query(_) | ExecutionError::Internal(_) => FailureKind::Execution,
        };
        let outcome = Outcome::failed(kind, user_friendly_message(&err.to_string()));

        if config.query.cache_enabled && err.is_cacheable() {
            self.caches
                .exception
                .put(key.clone(), outcome.response.clone());
        }
        outcome
    }

    fn authorize(
        &self,
        caller: &Caller,
        response: &QueryResponse,
    ) -> Result<(), AccessDenied> {
        match response.cube.as_deref() {
            Some(realization) => self.authorizer.check_authorization(caller, realization),
            None => Err(AccessDenied(
                "the result does not name the realization it came from".to_string(),
            )),
        }
    }
}

/// Cost-based admission: only results expensive to recompute are kept.
fn worth_caching(config: &Config, elapsed_ms: u64, scan_count: u64) -> bool {
    elapsed_ms > config.query.duration_threshold_ms
        || scan_count > config.query.scan_count_threshold
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
