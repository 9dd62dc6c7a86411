//! Logging initialization.
//!
//! Thin wrapper over the `observability` package so binaries only pass a
//! level and a service name.

use crate::Paths;
use observability::LogConfig;

/// Initialize logging for the command-line client.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str) {
    init_logging_for_service("cli", level, false);
}

/// Initialize logging with a custom service name.
///
/// The log file lives under the client's state directory; when the home
/// directory cannot be resolved the observability default is used.
pub fn init_logging_for_service(service_name: &str, level: &str, also_stderr: bool) {
    let log_path = Paths::new().ok().map(|paths| paths.log_file());

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path,
        also_stderr,
    });
}

/// Parse a log level string, defaulting to INFO for unknown input.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
