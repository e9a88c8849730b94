use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    // `"code": "AB12CD"` in JSON payloads and `code=AB12CD` in free text
    static ref STUDENT_CODE_REGEX: Regex =
        Regex::new(r#"(?P<key>"code"\s*:\s*"|\bcode\s*[=:]\s*)(?P<value>[A-Z0-9]{6})\b"#).unwrap();
    static ref PASSWORD_REGEX: Regex =
        Regex::new(r#"(?P<key>"password"\s*:\s*")(?P<value>(?:[^"\\]|\\.)*)""#).unwrap();
}

/// Redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_student_codes: bool,
    pub redact_passwords: bool,
    pub hash_for_correlation: bool,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_student_codes: true,
            redact_passwords: true,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }
}

impl RedactionConfig {
    /// Disable every built-in pattern
    pub fn disabled() -> Self {
        Self {
            redact_emails: false,
            redact_student_codes: false,
            redact_passwords: false,
            hash_for_correlation: false,
            custom_patterns: Vec::new(),
        }
    }
}

/// Masks login credentials before they are written to logs.
///
/// Student codes are bearer credentials: anyone holding one can sign in as the
/// student, so they are treated like passwords.
#[derive(Debug, Clone, Default)]
pub struct PiiRedactor {
    config: RedactionConfig,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if self.config.redact_passwords {
            result = PASSWORD_REGEX
                .replace_all(&result, "${key}***\"")
                .into_owned();
        }

        if self.config.redact_student_codes {
            result = self.redact_student_codes(&result);
        }

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).into_owned();
        }

        result
    }

    fn redact_student_codes(&self, text: &str) -> String {
        STUDENT_CODE_REGEX
            .replace_all(text, |caps: &regex::Captures| {
                let key = &caps["key"];
                if self.config.hash_for_correlation {
                    format!("{key}CODE[{}]", self.hash_value(&caps["value"]))
                } else {
                    format!("{key}******")
                }
            })
            .into_owned()
    }

    fn redact_emails(&self, text: &str) -> String {
        EMAIL_REGEX
            .replace_all(text, |caps: &regex::Captures| {
                let email = &caps[0];
                if self.config.hash_for_correlation {
                    return format!("EMAIL[{}]", self.hash_value(email));
                }
                match email.split_once('@') {
                    Some((local, domain)) => {
                        let l = local.chars().next().unwrap_or('*');
                        let d = domain.chars().next().unwrap_or('*');
                        format!("{l}***@{d}***")
                    }
                    None => "***@***".to_string(),
                }
            })
            .into_owned()
    }

    fn hash_value(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        let digest = hasher.finalize();
        // first 8 bytes keep the marker short
        general_purpose::STANDARD_NO_PAD.encode(&digest[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_redaction() {
        let redactor = PiiRedactor::default();

        let redacted = redactor.redact("Teacher jane.doe@school.example logged in");
        assert!(redacted.contains("j***@s***"));
        assert!(!redacted.contains("jane.doe"));
    }

    #[test]
    fn test_student_code_redaction_in_json() {
        let redactor = PiiRedactor::default();

        let payload = r#"{"id":"s1","role":"student","code":"AB12CD","displayName":"Quiet Otter"}"#;
        let redacted = redactor.redact(payload);
        assert!(redacted.contains(r#""code":"******""#));
        assert!(redacted.contains("Quiet Otter"));
    }

    #[test]
    fn test_student_code_redaction_in_text() {
        let redactor = PiiRedactor::default();

        assert_eq!(redactor.redact("login attempt code=ZX98QW"), "login attempt code=******");
    }

    #[test]
    fn test_password_redaction() {
        let redactor = PiiRedactor::default();

        let redacted = redactor.redact(r#"{"password":"hunter\"2","role":"teacher"}"#);
        assert_eq!(redacted, r#"{"password":"***","role":"teacher"}"#);
    }

    #[test]
    fn test_hash_for_correlation_is_stable() {
        let redactor = PiiRedactor::new(RedactionConfig {
            hash_for_correlation: true,
            ..Default::default()
        });

        let first = redactor.redact("code=AB12CD");
        let second = redactor.redact("code=AB12CD");
        assert_eq!(first, second);
        assert!(first.starts_with("code=CODE["));
        assert!(!first.contains("AB12CD"));
    }

    #[test]
    fn test_disabled_redaction_is_passthrough() {
        let redactor = PiiRedactor::new(RedactionConfig::disabled());
        let text = r#"{"code":"AB12CD","email":"a@b.example"}"#;
        assert_eq!(redactor.redact(text), text);
    }
}
