//! `QueryGate` Server Binary
//!
//! Serves the query API in front of a remote engine.
//!
//! ## Usage
//!
//! ```bash
//! # Start with config.toml / config.local.toml / QUERYGATE_* from the cwd
//! cargo run --bin querygate-server
//!
//! # Explicit config file and bind address
//! cargo run --bin querygate-server -- --config /etc/querygate.toml --port 7070
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use querygate::config::ConfigSource;
use querygate::logging::init_tracing;
use querygate::rest;
use querygate::{
    AclAuthorizer, AsyncQueryLog, Config, QueryCaches, QueryGatekeeper, RemoteExecutor,
    SharedConfig,
};

const QUERY_LOG_CAPACITY: usize = 4096;

#[derive(Debug, Parser)]
#[command(name = "querygate-server", version, about = "Query gatekeeper HTTP server")]
struct Args {
    /// Config file; defaults to config.toml + config.local.toml in the cwd
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `http.host`
    #[arg(long)]
    host: Option<String>,

    /// Override `http.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    init_tracing(&config.logging);

    let mut http_config = config.http.clone();
    if let Some(host) = args.host {
        http_config.host = host;
    }
    if let Some(port) = args.port {
        http_config.port = port;
    }

    let executor = RemoteExecutor::new(&config.engine, tokio::runtime::Handle::current())
        .context("failed to build engine client")?;
    let caches = QueryCaches::from_config(&config.cache);
    info!(
        mode = %config.server.mode,
        engine = %config.engine.url,
        cache_enabled = config.query.cache_enabled,
        secure_enabled = config.query.secure_enabled,
        "querygate_starting"
    );

    let shared = Arc::new(SharedConfig::new(config));
    let source: Arc<dyn ConfigSource> = shared.clone();

    let gatekeeper = Arc::new(QueryGatekeeper::new(
        source.clone(),
        caches,
        Arc::new(executor),
        Arc::new(AclAuthorizer::new(source)),
        Arc::new(AsyncQueryLog::new(QUERY_LOG_CAPACITY).context("failed to start query log")?),
    ));

    if http_config.config_reload_secs > 0 {
        spawn_reloader(
            shared,
            args.config,
            Duration::from_secs(http_config.config_reload_secs),
        );
    }

    rest::start_http_server(gatekeeper, &http_config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load().context("failed to load config"),
    }
}

/// Periodically re-read the configuration. A bad file is logged and the
/// running configuration kept.
fn spawn_reloader(shared: Arc<SharedConfig>, path: Option<PathBuf>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; the startup load already covered it
        interval.tick().await;
        loop {
            interval.tick().await;
            let result = match &path {
                Some(path) => shared.reload_from(path),
                None => Config::load().map(|config| shared.store(config)),
            };
            match result {
                Ok(()) => info!(mode = %shared.current().server.mode, "config_reloaded"),
                Err(e) => warn!(error = %e, "config_reload_failed"),
            }
        }
    });
}
