//! Tracing setup: human-readable stderr plus optional JSON file logging.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Map CLI verbosity flags onto a filter directive.
///
/// `-v` and above win over the configured level; `--quiet` wins over both.
pub fn filter_directive(verbose: u8, quiet: bool, configured: &str) -> String {
    match verbose {
        0 if quiet => "error".to_string(),
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, replaces the stderr directive. The returned guard
/// must be held for the lifetime of the process so buffered JSON lines are
/// flushed on exit.
pub fn init_tracing(verbose: u8, quiet: bool, config: &LoggingConfig) -> Option<WorkerGuard> {
    let directive = filter_directive(verbose, quiet, &config.level);
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let (json_layer, guard) = match &config.directory {
        Some(dir) => {
            let _ = std::fs::create_dir_all(dir);
            let file_appender = tracing_appender::rolling::daily(dir, "shapwell.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .try_init();

    guard
}
