use thiserror::Error;

/// Stable error code reporting, implemented by every crate error in the workspace
pub trait ErrorCode {
    /// Machine-readable code from [`crate::codes`]
    fn code(&self) -> &'static str;
}

/// Top-level error for binaries and integration points
#[derive(Error, Debug)]
pub enum EngineError {
    /// Error raised by a workspace crate, tagged with its code
    #[error("[{code}] {message}")]
    Coded { code: &'static str, message: String },

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Capture a workspace error together with its code
    pub fn from_coded<E>(error: &E) -> Self
    where
        E: ErrorCode + std::fmt::Display,
    {
        Self::Coded {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Coded { code, .. } => code,
            Self::Other(_) => crate::codes::INTERNAL,
        }
    }
}

/// Result type alias for engine entry points
pub type Result<T> = std::result::Result<T, EngineError>;

/// Log an error together with its code
pub fn log_error(context: &str, error: &EngineError) {
    tracing::error!(
        context = context,
        error_code = error.code(),
        error = %error,
        "Learnmap engine error occurred"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("collection 'nope' not found")]
    struct Missing;

    impl ErrorCode for Missing {
        fn code(&self) -> &'static str {
            crate::codes::not_found::COLLECTION_NOT_FOUND
        }
    }

    #[test]
    fn test_coded_error_keeps_code_and_message() {
        let err = EngineError::from_coded(&Missing);
        assert_eq!(err.code(), "NOTFOUND_3001");
        assert_eq!(err.to_string(), "[NOTFOUND_3001] collection 'nope' not found");
    }

    #[test]
    fn test_wrapped_errors_are_internal() {
        let err = EngineError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.code(), crate::codes::INTERNAL);
    }
}
