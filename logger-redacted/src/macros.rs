// Logging macros

/// `info!` with the given payload rendered through the default redactor
#[macro_export]
macro_rules! redacted_info {
    ($payload:expr, $($arg:tt)*) => {
        tracing::info!(payload = %$crate::redact($payload), $($arg)*)
    };
}

/// `debug!` with the given payload rendered through the default redactor
#[macro_export]
macro_rules! redacted_debug {
    ($payload:expr, $($arg:tt)*) => {
        tracing::debug!(payload = %$crate::redact($payload), $($arg)*)
    };
}
