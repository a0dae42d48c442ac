//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (QUERYGATE_* prefix)
//!
//! Every value the gatekeeper consults is read through a [`ConfigSource`]
//! at the start of each request, so a reload takes effect on the next call.
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [server]
//! mode = "query"
//!
//! [query]
//! cache_enabled = true
//! duration_threshold_ms = 2000
//! scan_count_threshold = 10240
//!
//! [cache.success]
//! max_entries = 10000
//! ttl_secs = 3600
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUERYGATE_SERVER__MODE=all
//! QUERYGATE_QUERY__SECURE_ENABLED=false
//! ```

use arc_swap::ArcSwap;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::Role;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Serving role of this instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Serves queries and runs jobs
    #[default]
    All,
    /// Serves queries only
    Query,
    /// Runs jobs only; queries are rejected
    Job,
}

impl ServerMode {
    /// Whether this mode admits query execution.
    pub fn allows_query(self) -> bool {
        matches!(self, ServerMode::All | ServerMode::Query)
    }
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMode::All => write!(f, "all"),
            ServerMode::Query => write!(f, "query"),
            ServerMode::Job => write!(f, "job"),
        }
    }
}

impl FromStr for ServerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(ServerMode::All),
            "query" => Ok(ServerMode::Query),
            "job" => Ok(ServerMode::Job),
            _ => Err(format!(
                "Unknown server mode '{s}'. Valid modes: all, query, job"
            )),
        }
    }
}

/// Instance role settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default, deserialize_with = "deserialize_mode")]
    pub mode: ServerMode,
}

/// Query admission, caching and security switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Look up and populate the result/exception caches
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Re-check the caller against the realization that answered the query
    #[serde(default = "default_true")]
    pub secure_enabled: bool,

    /// Results whose execution took longer than this are cached
    #[serde(default = "default_duration_threshold_ms")]
    pub duration_threshold_ms: u64,

    /// Results that scanned more rows than this are cached
    #[serde(default = "default_scan_count_threshold")]
    pub scan_count_threshold: u64,

    /// Execution deadline handed to the executor. 0 = no timeout.
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Capacity and expiry for both cache regions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_success_region")]
    pub success: RegionConfig,
    #[serde(default = "default_exception_region")]
    pub exception: RegionConfig,
}

/// Capacity and expiry of a single cache region
///
/// A table that sets only one field takes the other from the success
/// region's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Maximum number of entries before LRU eviction
    #[serde(default = "default_region_max_entries")]
    pub max_entries: usize,
    /// Time-to-live in seconds (0 = never expires)
    #[serde(default = "default_region_ttl_secs")]
    pub ttl_secs: u64,
}

/// Downstream query engine endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// URL the remote executor posts query requests to
    #[serde(default = "default_engine_url")]
    pub url: String,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Realization access control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Role assigned to callers that present none
    #[serde(default = "default_role")]
    pub default_role: Role,

    /// Realization name -> grants
    #[serde(default)]
    pub acl: BTreeMap<String, AclEntry>,
}

/// Who may read a realization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Re-read the config file every N seconds. 0 = disabled.
    #[serde(default)]
    pub config_reload_secs: u64,
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_duration_threshold_ms() -> u64 {
    2000
}
fn default_scan_count_threshold() -> u64 {
    10240
}
fn default_region_max_entries() -> usize {
    10_000
}
fn default_region_ttl_secs() -> u64 {
    3600
}
fn default_success_region() -> RegionConfig {
    RegionConfig {
        max_entries: default_region_max_entries(),
        ttl_secs: default_region_ttl_secs(),
    }
}
fn default_exception_region() -> RegionConfig {
    RegionConfig {
        max_entries: 1000,
        ttl_secs: 600,
    }
}
fn default_engine_url() -> String {
    "http://127.0.0.1:7071/engine/query".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_role() -> Role {
    Role::Viewer
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    7070
}
fn default_max_body_bytes() -> usize {
    1_048_576 // 1 MB
}

fn deserialize_mode<'de, D>(deserializer: D) -> Result<ServerMode, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (QUERYGATE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("QUERYGATE_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("QUERYGATE_").split("__"))
            .extract()
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            cache_enabled: true,
            secure_enabled: true,
            duration_threshold_ms: default_duration_threshold_ms(),
            scan_count_threshold: default_scan_count_threshold(),
            timeout_ms: 0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            success: default_success_region(),
            exception: default_exception_region(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            url: default_engine_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            default_role: default_role(),
            acl: BTreeMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            max_body_bytes: default_max_body_bytes(),
            config_reload_secs: 0,
        }
    }
}

/// Supplies the configuration in effect for the current request.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> Arc<Config>;
}

/// Hot-swappable configuration shared between the server and the gatekeeper.
///
/// Readers never block writers; a reload publishes a whole new snapshot.
pub struct SharedConfig {
    inner: ArcSwap<Config>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: ArcSwap::from_pointee(config),
        }
    }

    /// Publish a new configuration.
    pub fn store(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }

    /// Re-read `path`. On error the previous configuration stays in effect.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<(), figment::Error> {
        let config = Config::from_file(path)?;
        self.store(config);
        Ok(())
    }
}

impl ConfigSource for SharedConfig {
    fn current(&self) -> Arc<Config> {
        self.inner.load_full()
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
