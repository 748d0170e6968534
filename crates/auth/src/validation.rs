use once_cell::sync::Lazy;
use regex::Regex;

use crate::AuthError;

static ANONYMOUS_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid anonymous id regex"));

pub const MIN_DISPLAY_NAME_LENGTH: usize = 5;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 32;
pub const MAX_DEVICE_TOKEN_LENGTH: usize = 512;

/// Anonymous ids are opaque but must stay alphanumeric so they can be used in paths.
pub fn validate_anonymous_id(anonymous_id: &str) -> Result<(), AuthError> {
    if anonymous_id.is_empty() {
        return Err(AuthError::Validation("Anonymous ID is required".into()));
    }

    if !ANONYMOUS_ID_REGEX.is_match(anonymous_id) {
        return Err(AuthError::Validation(
            "Anonymous ID must be alphanumeric".into(),
        ));
    }

    Ok(())
}

pub fn validate_display_name(display_name: &str) -> Result<(), AuthError> {
    let length = display_name.trim().chars().count();

    if length < MIN_DISPLAY_NAME_LENGTH {
        return Err(AuthError::Validation(format!(
            "Display name must be at least {MIN_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    if length > MAX_DISPLAY_NAME_LENGTH {
        return Err(AuthError::Validation(format!(
            "Display name must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    Ok(())
}

pub fn validate_device_token(token: &str) -> Result<(), AuthError> {
    if token.trim().is_empty() {
        return Err(AuthError::Validation("Device token must not be blank".into()));
    }

    if token.len() > MAX_DEVICE_TOKEN_LENGTH {
        return Err(AuthError::Validation("Device token is too long".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_id_must_be_alphanumeric() {
        assert!(validate_anonymous_id("a1b2c3d4e5f60718").is_ok());
        assert!(validate_anonymous_id("ABCdef123").is_ok());
        assert!(validate_anonymous_id("").is_err());
        assert!(validate_anonymous_id("abc-123").is_err());
        assert!(validate_anonymous_id("abc 123").is_err());
        assert!(validate_anonymous_id("../etc").is_err());
    }

    #[test]
    fn display_name_needs_five_characters() {
        assert!(validate_display_name("User1234").is_ok());
        assert!(validate_display_name("Ghost").is_ok());
        assert!(validate_display_name("Gho").is_err());
        assert!(validate_display_name("   ab   ").is_err());
        assert!(validate_display_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn device_token_rejects_blank_and_oversized_values() {
        assert!(validate_device_token("ExponentPushToken[abc]").is_ok());
        assert!(validate_device_token("  ").is_err());
        assert!(validate_device_token(&"t".repeat(513)).is_err());
    }
}
