use crate::{error::Result, validation};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "LEARNMAP_";

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub authz: AuthzConfig,
    pub migrations: MigrationConfig,
    pub logging: LoggerConfig,
}

/// Access decision point settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Deadline for all relation-traversal lookups of a single decision
    pub lookup_timeout_ms: u64,
    /// Attach debug traces to batch authorization responses
    pub debug: bool,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2_000,
            debug: false,
        }
    }
}

impl AuthzConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Migration runner settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// JSON file holding the persisted schema and applied migration versions
    pub state_path: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("learnmap-schema.json"),
        }
    }
}

/// Builder over the configuration sources
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a YAML file; a missing file is skipped
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    fn figment(&self) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(ref file) = self.file {
            debug!("Merging configuration file {}", file.display());
            figment = figment.merge(Yaml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Merge all sources and validate the result
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError`] when a source cannot be parsed or the
    /// merged configuration fails validation.
    pub fn load(&self) -> Result<EngineConfig> {
        let config: EngineConfig = self.figment().extract()?;
        validation::validate(&config)?;
        Ok(config)
    }
}
