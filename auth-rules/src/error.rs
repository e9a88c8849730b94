use error_common::{codes, ErrorCode};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Parse error at offset {offset} in rule `{rule}`: {message}")]
    Parse {
        rule: String,
        offset: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Record not found: {collection}/{id}")]
    RecordNotFound { collection: String, id: String },

    #[error("Relation lookup exceeded its {0:?} deadline")]
    LookupTimeout(Duration),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthzError {
    pub fn record_not_found(collection: &str, id: &str) -> Self {
        Self::RecordNotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. } | Self::CollectionNotFound(_))
    }
}

impl ErrorCode for AuthzError {
    fn code(&self) -> &'static str {
        match self {
            Self::Parse { rule, .. } if rule.trim().is_empty() => codes::rule::EMPTY_RULE,
            Self::Parse { .. } => codes::rule::PARSE_ERROR,
            Self::Config(_) => codes::schema::CONFIG_ERROR,
            Self::InvalidSchema(_) => codes::schema::INVALID_SCHEMA,
            Self::Validation(_) => codes::schema::VALIDATION_FAILED,
            Self::CollectionNotFound(_) => codes::not_found::COLLECTION_NOT_FOUND,
            Self::RecordNotFound { .. } => codes::not_found::RECORD_NOT_FOUND,
            Self::LookupTimeout(_) => codes::authorization::LOOKUP_TIMEOUT,
            Self::Storage(_) => codes::authorization::STORAGE_FAILURE,
            Self::Internal(_) => codes::INTERNAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthzError>;
