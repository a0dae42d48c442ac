//! HTTP API Module
//!
//! Exposes the gatekeeper over HTTP. Query endpoints take the caller from
//! `X-Query-User` / `X-Query-Roles`; identity is established by whatever
//! sits in front of this server.
//!
//! ## Routes
//! ```text
//! POST /query                  run a query, JSON response
//! POST /query/prestate         prepared-statement variant of /query
//! GET  /query/format/:format   run a query, download as result.<format>
//! GET  /health                 liveness + uptime
//! GET  /stats                  gatekeeper and cache counters
//! ```

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::HttpConfig;
use crate::gatekeeper::QueryGatekeeper;

pub use handlers::caller_from_headers;

/// Creates the Axum router
pub fn create_router(gatekeeper: Arc<QueryGatekeeper>, config: &HttpConfig) -> Router {
    Router::new()
        .route("/query", post(handlers::query))
        .route("/query/prestate", post(handlers::prepare_query))
        .route("/query/format/:format", get(handlers::download_query_result))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .layer(Extension(gatekeeper))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM; in-flight requests are allowed
/// to finish before this returns.
pub async fn start_http_server(
    gatekeeper: Arc<QueryGatekeeper>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(gatekeeper, config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let socket = tokio::net::TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    info!(%addr, "http_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http_server_stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => { info!(signal = "SIGINT", "shutdown_requested"); }
                    _ = sigterm.recv() => { info!(signal = "SIGTERM", "shutdown_requested"); }
                }
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_unavailable");
                let _ = ctrl_c.await;
                info!(signal = "SIGINT", "shutdown_requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            warn!(error = %e, "ctrl_c_handler_unavailable");
            return;
        }
        info!(signal = "SIGINT", "shutdown_requested");
    }
}
