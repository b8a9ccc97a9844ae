//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest nickname accepted, in characters.
pub const NICKNAME_MAX_CHARS: usize = 24;

/// Validates that a nickname is non-blank, short, and free of control characters.
///
/// # Examples
///
/// ```ignore
/// validate_nickname("quizzer")   // Ok
/// validate_nickname("   ")       // Err - blank
/// validate_nickname("tab\there") // Err - control character
/// ```
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("nickname_blank");
        err.message = Some("Nickname must not be blank".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > NICKNAME_MAX_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be at most {NICKNAME_MAX_CHARS} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("nickname_format");
        err.message = Some("Nickname must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Longest reaction accepted, in characters.
pub const REACTION_MAX_CHARS: usize = 32;

/// Validates that a reaction is a short, non-blank, printable label.
pub fn validate_reaction(reaction: &str) -> Result<(), ValidationError> {
    let trimmed = reaction.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > REACTION_MAX_CHARS {
        let mut err = ValidationError::new("reaction_length");
        err.message = Some(
            format!("Reaction must be 1 to {REACTION_MAX_CHARS} characters (got {length})").into(),
        );
        return Err(err);
    }
    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("reaction_format");
        err.message = Some("Reaction must not contain control characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a survival speed modifier lies in `(0, 1]`.
pub fn validate_speed_modifier(modifier: f64) -> Result<(), ValidationError> {
    if modifier > 0.0 && modifier <= 1.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("speed_modifier_range");
        err.message = Some(format!("Speed modifier must be in (0, 1] (got {modifier})").into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_nickname_valid() {
        assert!(validate_nickname("quizzer").is_ok());
        assert!(validate_nickname("  padded  ").is_ok());
        assert!(validate_nickname("émile").is_ok());
    }

    #[test]
    fn test_validate_nickname_invalid() {
        assert!(validate_nickname("").is_err());
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(NICKNAME_MAX_CHARS + 1)).is_err());
        assert!(validate_nickname("tab\there").is_err());
    }

    #[test]
    fn test_validate_speed_modifier() {
        assert!(validate_speed_modifier(1.0).is_ok());
        assert!(validate_speed_modifier(0.9).is_ok());
        assert!(validate_speed_modifier(0.0).is_err());
        assert!(validate_speed_modifier(1.5).is_err());
    }

    #[test]
    fn test_validate_reaction() {
        assert!(validate_reaction("clap").is_ok());
        assert!(validate_reaction(" 🎉 ").is_ok());
        assert!(validate_reaction("  ").is_err());
        assert!(validate_reaction(&"x".repeat(REACTION_MAX_CHARS + 1)).is_err());
        assert!(validate_reaction("a\nb").is_err());
    }
}
