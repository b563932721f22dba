//! Structured logging setup for dockhand
//!
//! Initialization and configuration for structured logging using the
//! `tracing` ecosystem. Log output always goes to stderr so that stdout
//! stays reserved for command output (for example `status --format json`).
//!
//! # Features
//!
//! - Console output with pretty formatting (default)
//! - Optional JSON output for structured log collection
//! - Environment-based configuration via `RUST_LOG`
//! - Thread-safe, can only be initialized once
//!
//! # Example
//!
//! ```no_run
//! use dockhand::util::logging;
//!
//! // Initialize from DOCKHAND_LOG_LEVEL / DOCKHAND_LOG_JSON
//! logging::init_from_env();
//!
//! use tracing::{info, warn};
//!
//! info!("provisioning started");
//! warn!(service = "pgvector", "container restarted");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to display
    pub level: Level,

    /// Use JSON output format (for structured logging)
    pub use_json: bool,

    /// Include the module target (e.g., dockhand::build) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    /// Creates a default logging configuration
    ///
    /// Defaults:
    /// - Level: INFO
    /// - JSON: false (pretty console output)
    /// - Target: true
    /// - Location: false (for cleaner output)
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a logging configuration with the specified level
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }
}

/// Parses a log level from a string
///
/// Returns the corresponding `Level`, or `Level::INFO` if parsing fails.
///
/// # Example
///
/// ```
/// use dockhand::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("INFO"), Level::INFO);
/// assert_eq!(parse_level("invalid"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Initializes the logging system with the provided configuration
///
/// Sets up the `tracing` subscriber writing to stderr. Can only be called
/// once - subsequent calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env()
            .add_directive(format!("dockhand={}", config.level).parse().unwrap());

        // If RUST_LOG is not set, quiet the HTTP stack used by the probes
        if env::var("RUST_LOG").is_err() {
            filter = filter
                .add_directive("h2=warn".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap());
        }

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .init();
        }
    });
}

/// Initializes logging with default configuration
pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from environment variables
///
/// Reads configuration from:
/// - `DOCKHAND_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
/// - `DOCKHAND_LOG_JSON` - Use JSON output (true/false)
/// - `RUST_LOG` - Standard Rust log filtering
///
/// Falls back to default configuration if environment variables are not set.
pub fn init_from_env() {
    let level_str = env::var("DOCKHAND_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let level = parse_level(&level_str);

    let use_json = env::var("DOCKHAND_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    let config = LoggingConfig {
        level,
        use_json,
        ..Default::default()
    };

    init_logging(config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
    }

    #[test]
    fn test_parse_level_invalid() {
        // Invalid levels default to INFO
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.include_target);
        assert!(!config.include_location);
    }

    #[test]
    fn test_with_level() {
        let config = LoggingConfig::with_level(Level::DEBUG);
        assert_eq!(config.level, Level::DEBUG);
        assert!(!config.use_json);
    }
}
