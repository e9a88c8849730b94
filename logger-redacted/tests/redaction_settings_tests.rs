//! Redaction settings applied by `init_logging`
//!
//! Runs in its own binary: it installs the global subscriber and swaps the
//! process-wide redactor.

use logger_redacted::{init_logging, redact, LoggerConfig};

const PAYLOAD: &str = r#"{"id":"s1","role":"student","code":"QW12ER"}"#;

#[test]
fn test_init_logging_applies_settings_after_early_redact() {
    println!("\n🔒 Redaction settings after an early redact() call");

    // the default redactor is in place before logging starts
    assert!(!redact(PAYLOAD).contains("QW12ER"));

    let config = LoggerConfig {
        redaction_enabled: false,
        ..LoggerConfig::default()
    };
    let _guard = init_logging(&config).unwrap();

    assert_eq!(redact(PAYLOAD), PAYLOAD, "disabled redaction must not be ignored");

    println!("✅ Configured redaction replaced the default");
}
