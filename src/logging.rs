//! Tracing subscriber setup for the server binary.
//!
//! Level and format come from `[logging]`. Setting `QUERYGATE_TRACE_FILE`
//! sends output to that file through a non-blocking writer instead of stderr.

use std::env;
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(logging_config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging_config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = logging_config.format.eq_ignore_ascii_case("json");

    let (writer, guard) = match env::var("QUERYGATE_TRACE_FILE") {
        Ok(log_path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open QUERYGATE_TRACE_FILE '{log_path}': {e}");
                    return;
                }
            };
            tracing_appender::non_blocking(file)
        }
        Err(_) => tracing_appender::non_blocking(std::io::stderr()),
    };
    let _ = TRACE_GUARD.set(guard);

    let base = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(writer);

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base.json().finish())
    } else {
        Box::new(base.compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
