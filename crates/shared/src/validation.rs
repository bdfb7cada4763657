//! Common validation utilities.

use validator::{ValidateEmail, ValidationError};

/// Normalizes an email address for comparison: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Compares two email addresses case-insensitively, ignoring surrounding whitespace.
///
/// Blank addresses never match anything.
pub fn emails_match(a: &str, b: &str) -> bool {
    let a = normalize_email(a);
    !a.is_empty() && a == normalize_email(b)
}

/// Validates that a profile email is well formed.
pub fn validate_profile_email(email: &str) -> Result<(), ValidationError> {
    if normalize_email(email).validate_email() {
        Ok(())
    } else {
        let mut err = ValidationError::new("email_format");
        err.message = Some("Profile email must be a valid email address".into());
        Err(err)
    }
}
