// Logger configuration
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default level for the workspace crates when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
    /// Mask student codes, passwords and e-mail addresses in rendered payloads
    pub redaction_enabled: bool,
    /// Replace masked values with a short hash so entries stay correlatable
    pub hash_for_correlation: bool,
    /// Directory for daily-rolled log files; stdout only when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            redaction_enabled: true,
            hash_for_correlation: false,
            file: None,
        }
    }
}

impl LoggerConfig {
    pub const LEVELS: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    pub fn is_valid_level(&self) -> bool {
        Self::LEVELS.contains(&self.level.to_ascii_lowercase().as_str())
    }
}
