//! REST API endpoint tests (tower test utilities, no server needed).

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use querygate::auth::{AccessDenied, Authorizer, Caller, Role};
use querygate::cache::QueryCaches;
use querygate::config::{Config, ConfigSource, HttpConfig, ServerMode, SharedConfig};
use querygate::diagnostics::DiagnosticContext;
use querygate::execution::{ExecutionContext, ExecutionError, ExecutionResult, QueryExecutor};
use querygate::gatekeeper::QueryGatekeeper;
use querygate::model::{ColumnMeta, QueryRequest, QueryResponse};
use querygate::query_log::TracingQueryLog;
use querygate::rest::create_router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Answers from `sales_cube`; `FROM missing` fails like an unknown table.
struct FakeEngine;

impl QueryExecutor for FakeEngine {
    fn run_query(&self, request: &QueryRequest, _: &ExecutionContext) -> ExecutionResult<QueryResponse> {
        if request.sql.contains("missing") {
            return Err(ExecutionError::Query("Table 'MISSING' not found".to_string()));
        }
        Ok(QueryResponse::success(
            vec![ColumnMeta::new("REGION", "VARCHAR"), ColumnMeta::new("TOTAL", "BIGINT")],
            vec![
                vec![Some("North, East".to_string()), Some("1200".to_string())],
                vec![Some("South".to_string()), None],
            ],
            "sales_cube",
            20_000,
        ))
    }
}

/// Only analysts and admins may read anything.
struct AnalystsOnly;

impl Authorizer for AnalystsOnly {
    fn check_authorization(&self, caller: &Caller, realization: &str) -> Result<(), AccessDenied> {
        if caller.has_role(Role::Analyst) || caller.has_role(Role::Admin) {
            Ok(())
        } else {
            Err(AccessDenied(format!("'{}' cannot read '{realization}'", caller.username)))
        }
    }
}

fn create_test_app_with(config: Config, http_config: &HttpConfig) -> axum::Router {
    let source: Arc<dyn ConfigSource> = Arc::new(SharedConfig::new(config));
    let gatekeeper = QueryGatekeeper::new(
        source,
        QueryCaches::default(),
        Arc::new(FakeEngine),
        Arc::new(AnalystsOnly),
        Arc::new(TracingQueryLog),
    )
    .with_diagnostics(Arc::new(DiagnosticContext::new()));
    create_router(Arc::new(gatekeeper), http_config)
}

fn create_test_app() -> axum::Router {
    create_test_app_with(Config::default(), &HttpConfig::default())
}

async fn send_json_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    roles: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-query-user", "alice");
    if let Some(roles) = roles {
        builder = builder.header("x-query-roles", roles);
    }
    let req = match method {
        "GET" => builder.body(Body::empty()).unwrap(),
        "POST" => builder
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_string(&body.unwrap_or(json!({}))).unwrap(),
            ))
            .unwrap(),
        _ => panic!("Unsupported method"),
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!({}));
    (status, json)
}

// Health & Stats
#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send_json_request(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["success"].as_bool().unwrap_or(false));
    assert_eq!(json["data"]["status"], "healthy");
    assert!(json["data"]["version"].is_string());
    assert!(json["data"]["uptime_secs"].is_number());
}

#[tokio::test]
async fn test_stats_reflect_cache_hits() {
    let app = create_test_app();
    let body = json!({"sql": "select * from sales", "project": "learn"});

    for _ in 0..2 {
        let (status, _) =
            send_json_request(&app, "POST", "/query", Some("analyst"), Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send_json_request(&app, "GET", "/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["gate"]["requests"], 2);
    assert_eq!(json["data"]["gate"]["executions"], 1);
    assert_eq!(json["data"]["gate"]["cache_hits"], 1);
    assert_eq!(json["data"]["success_cache"]["size"], 1);
}

// Query
#[tokio::test]
async fn test_query_returns_response() {
    let app = create_test_app();

    let (status, json) = send_json_request(
        &app,
        "POST",
        "/query",
        Some("analyst"),
        Some(json!({"sql": "select * from sales", "project": "learn", "limit": 10})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["success"].as_bool().unwrap());
    let data = &json["data"];
    assert_eq!(data["cube"], "sales_cube");
    assert_eq!(data["columnMetas"][0]["label"], "REGION");
    assert_eq!(data["results"][1][1], Value::Null);
    assert_eq!(data["isException"], false);
    assert_eq!(data["hitCache"], false);
    assert!(data["duration"].is_number());
}

#[tokio::test]
async fn test_second_query_hits_cache() {
    let app = create_test_app();
    let body = json!({"sql": "select * from sales", "project": "learn"});

    send_json_request(&app, "POST", "/query", Some("analyst"), Some(body.clone())).await;
    let (status, json) =
        send_json_request(&app, "POST", "/query", Some("analyst"), Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["hitCache"], true);
}

#[tokio::test]
async fn test_prestate_query() {
    let app = create_test_app();

    let (status, json) = send_json_request(
        &app,
        "POST",
        "/query/prestate",
        Some("analyst"),
        Some(json!({"sql": "select * from sales where region = ?", "project": "learn"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["cube"], "sales_cube");
}

#[tokio::test]
async fn test_non_select_is_bad_request() {
    let app = create_test_app();

    let (status, json) = send_json_request(
        &app,
        "POST",
        "/query",
        Some("analyst"),
        Some(json!({"sql": "drop table sales", "project": "learn"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "UNSUPPORTED_SQL");
    assert_eq!(json["error"]["message"], "Not Supported SQL.");
}

#[tokio::test]
async fn test_viewer_is_forbidden() {
    let app = create_test_app();

    let (status, json) = send_json_request(
        &app,
        "POST",
        "/query",
        Some("viewer"),
        Some(json!({"sql": "select * from sales", "project": "learn"})),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "ACCESS_DENIED");
}

#[tokio::test]
async fn test_default_role_applies_without_header() {
    let mut config = Config::default();
    config.security.default_role = Role::Analyst;
    let app = create_test_app_with(config, &HttpConfig::default());

    let (status, _) = send_json_request(
        &app,
        "POST",
        "/query",
        None,
        Some(json!({"sql": "select * from sales", "project": "learn"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_engine_failure_is_server_error() {
    let app = create_test_app();

    let (status, json) = send_json_request(
        &app,
        "POST",
        "/query",
        Some("analyst"),
        Some(json!({"sql": "select * from missing", "project": "learn"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "EXECUTION_ERROR");
    assert_eq!(json["error"]["message"], "Table 'MISSING' not found");
}

#[tokio::test]
async fn test_job_mode_rejects_queries() {
    let mut config = Config::default();
    config.server.mode = ServerMode::Job;
    let app = create_test_app_with(config, &HttpConfig::default());

    let (status, json) = send_json_request(
        &app,
        "POST",
        "/query",
        Some("analyst"),
        Some(json!({"sql": "select 1", "project": "learn"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "MODE_REJECTED");
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let app = create_test_app();

    let (status, _) = send_json_request(
        &app,
        "POST",
        "/query",
        Some("analyst"),
        Some(json!({"project": "learn"})),
    )
    .await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let http_config = HttpConfig {
        max_body_bytes: 64,
        ..HttpConfig::default()
    };
    let app = create_test_app_with(Config::default(), &http_config);
    let body = serde_json::to_string(&json!({
        "sql": format!("select {} from sales", "x, ".repeat(100)),
        "project": "learn"
    }))
    .unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// Export
#[tokio::test]
async fn test_download_csv() {
    let app = create_test_app();

    let req = Request::builder()
        .method("GET")
        .uri("/query/format/csv?sql=select%20*%20from%20sales&project=learn")
        .header("x-query-roles", "analyst")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv;charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"result.csv\""
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        "REGION,TOTAL\r\n\"North, East\",1200\r\nSouth,\r\n"
    );
}

#[tokio::test]
async fn test_download_rejects_bad_format() {
    let app = create_test_app();

    let (status, json) = send_json_request(
        &app,
        "GET",
        "/query/format/c.sv?sql=select%201&project=learn",
        Some("analyst"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_download_propagates_denial() {
    let app = create_test_app();

    let (status, _) = send_json_request(
        &app,
        "GET",
        "/query/format/csv?sql=select%201&project=learn",
        Some("viewer"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}
