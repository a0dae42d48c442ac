//! HTTP executor for an engine that speaks the query JSON protocol.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tokio::runtime::Handle;

use super::{ExecutionContext, ExecutionError, ExecutionResult, QueryExecutor};
use crate::config::EngineConfig;
use crate::model::{QueryRequest, QueryResponse};

/// Body posted to the engine.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EngineRequest<'a> {
    sql: &'a str,
    project: &'a str,
    offset: u64,
    limit: u64,
    accept_partial: bool,
    backdoor_toggles: &'a BTreeMap<String, String>,
}

/// Forwards queries to a remote engine over HTTP.
///
/// `run_query` blocks on the given runtime handle, so it must be called from
/// a thread outside the async context (e.g. `tokio::task::spawn_blocking`).
pub struct RemoteExecutor {
    client: reqwest::Client,
    url: String,
    runtime: Handle,
}

impl RemoteExecutor {
    pub fn new(config: &EngineConfig, runtime: Handle) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            runtime,
        })
    }

    async fn send(
        &self,
        request: &QueryRequest,
        ctx: &ExecutionContext,
    ) -> ExecutionResult<QueryResponse> {
        ctx.timeout.check()?;

        let body = EngineRequest {
            sql: &request.sql,
            project: &request.project,
            offset: request.offset,
            limit: request.limit,
            accept_partial: request.accept_partial,
            backdoor_toggles: &ctx.diagnostics,
        };

        let mut call = self.client.post(&self.url).json(&body);
        if let Some(remaining) = ctx.timeout.remaining() {
            call = call.timeout(remaining);
        }

        let response = call.send().await.map_err(|e| transport_error(&e, ctx))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<QueryResponse>()
                .await
                .map_err(|e| transport_error(&e, ctx));
        }

        let text = response.text().await.unwrap_or_default();
        let text = if text.trim().is_empty() {
            status.to_string()
        } else {
            text
        };
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExecutionError::AccessDenied(text),
            s if s.is_client_error() => ExecutionError::Query(text),
            _ => ExecutionError::Internal(text),
        })
    }
}

fn transport_error(err: &reqwest::Error, ctx: &ExecutionContext) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::Timeout(ctx.timeout.error())
    } else {
        ExecutionError::Internal(err.to_string())
    }
}

impl QueryExecutor for RemoteExecutor {
    fn run_query(
        &self,
        request: &QueryRequest,
        ctx: &ExecutionContext,
    ) -> ExecutionResult<QueryResponse> {
        self.runtime.block_on(self.send(request, ctx))
    }
}
