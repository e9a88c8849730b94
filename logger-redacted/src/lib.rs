//! Structured logging with credential redaction for the Learnmap engine
//!
//! Authorization traces routinely carry whole records: user rows with student
//! login codes, teacher e-mail addresses and password fields. This crate
//! installs the `tracing` subscriber for the workspace binaries and provides
//! the redactor every crate uses before rendering such payloads.
//!
//! # Key Features
//!
//! - **Subscriber setup**: `EnvFilter` honouring `RUST_LOG`, human-readable or
//!   JSON output with RFC 3339 timestamps, optional daily-rolled log files
//! - **Credential redaction**: student codes (`"code":"AB12CD"`), password
//!   fields and e-mail addresses are masked
//! - **Hash-based correlation**: masked values can be replaced with a short
//!   SHA-256 digest so repeated occurrences stay correlatable
//!
//! # Example
//!
//! ```rust
//! use logger_redacted::{redact, PiiRedactor};
//!
//! let line = redact(r#"{"role":"student","code":"AB12CD"}"#);
//! assert_eq!(line, r#"{"role":"student","code":"******"}"#);
//!
//! let strict = PiiRedactor::default();
//! assert!(!strict.redact("mail jane@school.example").contains("jane"));
//! ```

pub mod config;
pub mod macros;
pub mod redactor;

pub use config::*;
pub use redactor::*;

use error_common::{codes, ErrorCode};
use lazy_static::lazy_static;
use parking_lot::RwLock;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

lazy_static! {
    static ref REDACTOR: RwLock<PiiRedactor> = RwLock::new(PiiRedactor::default());
}

/// Crates whose events are enabled at the configured level by default
const WORKSPACE_TARGETS: [&str; 4] = ["auth_rules", "schema_migrations", "config_engine", "learnmap"];

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Unknown log level: {0}")]
    InvalidLevel(String),

    #[error("Logging already initialised: {0}")]
    AlreadyInitialized(String),
}

impl ErrorCode for LoggerError {
    fn code(&self) -> &'static str {
        codes::config::VALIDATION_FAILED
    }
}

/// Keeps the background file writer alive; drop it last
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Redact a payload with the redactor installed by [`init_logging`], or the
/// default redactor when logging was never initialised
pub fn redact(text: &str) -> String {
    REDACTOR.read().redact(text)
}

/// Replace the redactor used by [`redact`]
pub fn install_redactor(config: RedactionConfig) {
    *REDACTOR.write() = PiiRedactor::new(config);
}

fn default_directives(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(WORKSPACE_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Install the global subscriber and the redactor
///
/// # Errors
///
/// Returns [`LoggerError::InvalidLevel`] for an unknown level and
/// [`LoggerError::AlreadyInitialized`] when a global subscriber exists.
pub fn init_logging(config: &LoggerConfig) -> Result<LoggingGuard, LoggerError> {
    if !config.is_valid_level() {
        return Err(LoggerError::InvalidLevel(config.level.clone()));
    }

    let redaction = if config.redaction_enabled {
        RedactionConfig {
            hash_for_correlation: config.hash_for_correlation,
            ..RedactionConfig::default()
        }
    } else {
        RedactionConfig::disabled()
    };
    install_redactor(redaction);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let stdout_layer = if config.json {
        fmt::layer()
            .with_target(false)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .boxed()
    };

    let (file_layer, file_guard) = match &config.file {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "learnmap.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(writer)
                .json()
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_workspace() {
        let directives = default_directives("DEBUG");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("auth_rules=debug"));
        assert!(directives.contains("schema_migrations=debug"));
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LoggerConfig {
            level: "chatty".to_string(),
            ..LoggerConfig::default()
        };
        assert!(matches!(init_logging(&config), Err(LoggerError::InvalidLevel(_))));
    }

    #[test]
    fn test_redact_macro_payloads() {
        let record = serde_json::json!({ "id": "s1", "code": "QW12ER" }).to_string();
        assert!(!redact(&record).contains("QW12ER"));
    }
}
