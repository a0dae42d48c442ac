//! Query, export and admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::warn;

use super::dto::{ApiResponse, HealthDto, StatsDto};
use super::error::RestError;
use crate::auth::{Caller, Role};
use crate::export;
use crate::gatekeeper::QueryGatekeeper;
use crate::model::{QueryRequest, QueryResponse};

pub const USER_HEADER: &str = "x-query-user";
pub const ROLES_HEADER: &str = "x-query-roles";

/// Build the caller from `X-Query-User` / `X-Query-Roles`.
///
/// Unknown role names are skipped; a caller left without roles gets
/// `default_role`.
pub fn caller_from_headers(headers: &HeaderMap, default_role: Role) -> Caller {
    let username = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous");

    let mut roles: Vec<Role> = headers
        .get(ROLES_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .filter(|r| !r.trim().is_empty())
                .filter_map(|r| match r.parse::<Role>() {
                    Ok(role) => Some(role),
                    Err(e) => {
                        warn!(error = %e, "ignoring_unknown_role");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    if roles.is_empty() {
        roles.push(default_role);
    }

    Caller::new(username, roles)
}

/// Run the gatekeeper off the async workers; the executor may block.
async fn run_query(
    gatekeeper: Arc<QueryGatekeeper>,
    headers: &HeaderMap,
    request: QueryRequest,
) -> Result<QueryResponse, RestError> {
    let default_role = gatekeeper.current_config().security.default_role;
    let caller = caller_from_headers(headers, default_role);

    let response = tokio::task::spawn_blocking(move || gatekeeper.execute(&caller, &request))
        .await
        .map_err(|e| RestError::internal(format!("Query task failed: {e}")))??;
    Ok(response)
}

/// `POST /query`
pub async fn query(
    Extension(gatekeeper): Extension<Arc<QueryGatekeeper>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResponse>>, RestError> {
    let response = run_query(gatekeeper, &headers, request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// `POST /query/prestate`
///
/// Same pipeline as `/query`; engines answer prepared statements with
/// their column metadata and an empty or capped result.
pub async fn prepare_query(
    Extension(gatekeeper): Extension<Arc<QueryGatekeeper>>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResponse>>, RestError> {
    let response = run_query(gatekeeper, &headers, request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// `GET /query/format/:format?sql=..&project=..`
pub async fn download_query_result(
    Extension(gatekeeper): Extension<Arc<QueryGatekeeper>>,
    Path(format): Path<String>,
    headers: HeaderMap,
    Query(request): Query<QueryRequest>,
) -> Result<Response, RestError> {
    // Validate the format before spending an engine call on it
    export::render(&QueryResponse::default(), &format)?;

    let response = run_query(gatekeeper, &headers, request).await?;
    let export = export::render(&response, &format)?;

    Ok((
        [
            (header::CONTENT_TYPE, export.content_type),
            (header::CONTENT_DISPOSITION, export.content_disposition),
        ],
        export.body,
    )
        .into_response())
}

/// `GET /health`
pub async fn health(
    Extension(gatekeeper): Extension<Arc<QueryGatekeeper>>,
) -> Json<ApiResponse<HealthDto>> {
    Json(ApiResponse::success(HealthDto {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: gatekeeper.stats().uptime_secs,
    }))
}

/// `GET /stats`
pub async fn stats(
    Extension(gatekeeper): Extension<Arc<QueryGatekeeper>>,
) -> Json<ApiResponse<StatsDto>> {
    let caches = gatekeeper.caches();
    Json(ApiResponse::success(StatsDto {
        gate: gatekeeper.stats(),
        success_cache: caches.success.stats(),
        exception_cache: caches.exception.stats(),
    }))
}
