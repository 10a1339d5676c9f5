use std::fmt;

use serde::{Deserialize, Serialize};

pub(crate) const USERNAME_RULE: &str = "Username must be 2-20 characters and contain only letters, numbers, dash, underscore, apostrophe, or period";
pub(crate) const PASSWORD_LENGTH_RULE: &str = "Password must be 8-64 characters";
pub(crate) const PASSWORD_CHARSET_RULE: &str =
    "Password must contain at least one letter, one number, and one special character";

/// Username/password pair posted to the login and signup relays.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validates a username.
///
/// A valid username is:
/// - 2 to 20 characters long
/// - Made only of ASCII letters, digits, `-`, `_`, `'` or `.`
#[must_use]
pub fn is_valid_username(s: &str) -> bool {
    (2..=20).contains(&s.len())
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'\'' | b'.'))
}

/// Returns the rule a password breaks, or `None` when it is acceptable.
///
/// Passwords are 8-64 printable ASCII characters containing at least one
/// letter, one digit and one punctuation character.
#[must_use]
pub fn password_problem(s: &str) -> Option<&'static str> {
    let len = s.chars().count();
    if !(8..=64).contains(&len) {
        return Some(PASSWORD_LENGTH_RULE);
    }
    let charset_ok = s.bytes().all(|b| b.is_ascii_graphic())
        && s.bytes().any(|b| b.is_ascii_alphabetic())
        && s.bytes().any(|b| b.is_ascii_digit())
        && s.bytes().any(|b| b.is_ascii_punctuation());
    if charset_ok {
        None
    } else {
        Some(PASSWORD_CHARSET_RULE)
    }
}

/// Per-field messages produced by [`validate_login_form`], for inline display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoginFormErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl LoginFormErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl fmt::Display for LoginFormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = [self.username.as_deref(), self.password.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        f.write_str(&messages.join("; "))
    }
}

/// Checks a login form before it is sent anywhere.
///
/// # Errors
///
/// Returns the per-field messages when any field is missing or malformed.
pub fn validate_login_form(form: &Credentials) -> Result<(), LoginFormErrors> {
    let mut errors = LoginFormErrors::default();

    let username = form.username.trim();
    if username.is_empty() {
        errors.username = Some("Username is required".into());
    } else if !is_valid_username(username) {
        errors.username = Some(USERNAME_RULE.into());
    }

    if form.password.is_empty() {
        errors.password = Some("Password is required".into());
    } else if let Some(rule) = password_problem(&form.password) {
        errors.password = Some(rule.into());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_username() {
        assert!(is_valid_username("alice01"));
        assert!(is_valid_username("o'neil.jr"));
        assert!(is_valid_username("ab"));
        assert!(is_valid_username("a-b_c"));
    }

    #[test]
    fn test_invalid_username_length() {
        assert!(!is_valid_username("a"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("abcdefghijklmnopqrstu")); // 21 chars
    }

    #[test]
    fn test_invalid_username_chars() {
        assert!(!is_valid_username("alice 01"));
        assert!(!is_valid_username("alice@01"));
        assert!(!is_valid_username("älice"));
    }

    #[test]
    fn test_password_rules() {
        assert_eq!(password_problem("Passw0rd!"), None);
        assert_eq!(password_problem("Pw0!"), Some(PASSWORD_LENGTH_RULE));
        assert_eq!(password_problem(&"a1!".repeat(22)), Some(PASSWORD_LENGTH_RULE));
        assert_eq!(password_problem("Password1"), Some(PASSWORD_CHARSET_RULE));
        assert_eq!(password_problem("password!"), Some(PASSWORD_CHARSET_RULE));
        assert_eq!(password_problem("12345678!"), Some(PASSWORD_CHARSET_RULE));
        assert_eq!(password_problem("Passw0rd !"), Some(PASSWORD_CHARSET_RULE));
    }

    #[test]
    fn test_login_form_ok() {
        assert!(validate_login_form(&Credentials::new("alice01", "Passw0rd!")).is_ok());
    }

    #[test]
    fn test_login_form_reports_both_fields() {
        let errors = validate_login_form(&Credentials::new("  ", "")).unwrap_err();
        assert_eq!(errors.username.as_deref(), Some("Username is required"));
        assert_eq!(errors.password.as_deref(), Some("Password is required"));
        assert_eq!(
            errors.to_string(),
            "Username is required; Password is required"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("alice01", "Passw0rd!"));
        assert!(debug.contains("alice01"));
        assert!(!debug.contains("Passw0rd!"));
    }
}
