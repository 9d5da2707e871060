//! Text Input Handling
//!
//! All user-supplied text is brought to Unicode NFC form before it is
//! validated or stored, so visually identical strings compare equal.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use validator::{ValidateEmail, ValidationError};

/// Usernames: 3-20 ASCII letters, digits or underscores
static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("username pattern is valid"));

/// Normalize a string to Unicode NFC form
pub fn normalize_input(value: &str) -> String {
    value.nfc().collect()
}

/// Normalize an optional string, leaving `None` untouched
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(normalize_input)
}

/// Request types whose text fields must be normalized before validation
pub trait Normalize {
    fn normalize(&mut self);

    /// Consume and return the normalized value
    fn normalized(mut self) -> Self
    where
        Self: Sized,
    {
        self.normalize();
        self
    }
}

/// Normalize a field in place
pub fn normalize_field(field: &mut String) {
    *field = normalize_input(field);
}

/// Normalize an optional field in place
pub fn normalize_optional_field(field: &mut Option<String>) {
    *field = normalize_optional(field.as_deref());
}

/// Check a (normalized) username against the username rule
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_PATTERN.is_match(username)
}

/// Validator hook for username fields
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if is_valid_username(username) {
        return Ok(());
    }

    tracing::warn!(username = %username, "Invalid username attempt");
    Err(ValidationError::new("username").with_message(Cow::Borrowed(
        "Username must be 3-20 characters, letters/numbers/underscores only.",
    )))
}

/// Validator hook for email fields
pub fn validate_email_address(email: &str) -> Result<(), ValidationError> {
    if email.validate_email() {
        return Ok(());
    }

    tracing::warn!(email = %email, "Invalid email attempt");
    Err(ValidationError::new("email").with_message(Cow::Borrowed("Enter a valid email address.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nfc_composes_combining_marks() {
        // "e" + COMBINING ACUTE ACCENT composes to U+00E9
        let decomposed = "caf\u{0065}\u{0301}";
        let normalized = normalize_input(decomposed);
        assert_eq!(normalized, "caf\u{00e9}");
        assert_eq!(normalized.chars().count(), 4);
    }

    #[test]
    fn test_nfc_is_idempotent() {
        let once = normalize_input("A\u{030a}ngstr\u{00f6}m");
        assert_eq!(normalize_input(&once), once);
    }

    #[test]
    fn test_normalize_optional_keeps_none() {
        assert_eq!(normalize_optional(None), None);
        assert_eq!(
            normalize_optional(Some("n\u{0303}")),
            Some("\u{00f1}".to_string())
        );
    }

    #[test]
    fn test_username_rule() {
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("user_name_2024"));
        assert!(is_valid_username(&"a".repeat(20)));

        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username(&"a".repeat(21)));
        assert!(!is_valid_username("bad-name"));
        assert!(!is_valid_username("with space"));
        assert!(!is_valid_username("caf\u{00e9}"));
        // Cyrillic "а" looks like Latin "a"
        assert!(!is_valid_username("\u{0430}dmin"));
    }

    #[test]
    fn test_validate_username_message() {
        let err = validate_username("x").unwrap_err();
        assert_eq!(err.code, "username");
        assert!(err.message.is_some());
    }

    #[test]
    fn test_validate_email_address() {
        assert!(validate_email_address("user@example.com").is_ok());
        assert!(validate_email_address("not-an-email").is_err());
        assert!(validate_email_address("").is_err());
    }
}
