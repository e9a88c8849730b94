// Configuration validation
use crate::{engine::EngineConfig, error::ConfigError};

/// Reject configurations the engine cannot run with
pub fn validate(config: &EngineConfig) -> crate::error::Result<()> {
    if config.authz.lookup_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "authz.lookup_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if config.migrations.state_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "migrations.state_path must not be empty".to_string(),
        ));
    }

    if !config.logging.is_valid_level() {
        return Err(ConfigError::ValidationError(format!(
            "logging.level '{}' is not one of {:?}",
            config.logging.level,
            logger_redacted::LoggerConfig::LEVELS
        )));
    }

    Ok(())
}
