use error_common::{codes, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration parsing failed: {0}")]
    ParseError(#[from] Box<figment::Error>),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::ParseError(Box::new(error))
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ParseError(_) => codes::config::LOAD_FAILED,
            Self::ValidationError(_) => codes::config::VALIDATION_FAILED,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
