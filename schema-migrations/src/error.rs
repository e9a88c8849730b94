use auth_rules::AuthzError;
use error_common::{codes, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Migration {version} ({name}) failed: {source}")]
    StepFailed {
        version: u64,
        name: String,
        #[source]
        source: AuthzError,
    },

    #[error("Invalid schema change: {0}")]
    InvalidChange(String),

    #[error("Duplicate migration version: {0}")]
    DuplicateVersion(u64),

    #[error("Migration state store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Inconsistent migration state: {0}")]
    InconsistentState(String),

    #[error("Schema error: {0}")]
    Schema(#[from] AuthzError),
}

impl MigrationError {
    pub fn step(version: u64, name: &str, source: AuthzError) -> Self {
        Self::StepFailed {
            version,
            name: name.to_string(),
            source,
        }
    }
}

impl ErrorCode for MigrationError {
    fn code(&self) -> &'static str {
        match self {
            Self::StepFailed { .. } | Self::InvalidChange(_) => codes::migration::STEP_FAILED,
            Self::DuplicateVersion(_) => codes::migration::DUPLICATE_VERSION,
            Self::Store(_) | Self::Io(_) | Self::Serialization(_) => {
                codes::migration::STATE_STORE_FAILED
            }
            Self::InconsistentState(_) => codes::migration::INCONSISTENT_STATE,
            Self::Schema(e) => e.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
