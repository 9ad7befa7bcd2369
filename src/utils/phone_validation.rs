//! E.164 phone number validation for outbound calls.

use once_cell::sync::Lazy;
use regex::Regex;

static E164_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("E164_REGEX is invalid"));

/// Validate a phone number and return it in canonical E.164 form.
///
/// Spaces, dashes, dots and parentheses are stripped first, so
/// `"+1 (555) 000-1111"` normalizes to `"+15550001111"`.
pub fn validate_phone_number(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Phone number must not be empty".to_string());
    }

    let normalized: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if E164_REGEX.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(format!(
            "Invalid phone number '{trimmed}': expected E.164 format like +15550001111"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_numbers() {
        assert_eq!(validate_phone_number("+15550001111").unwrap(), "+15550001111");
        assert_eq!(
            validate_phone_number(" +1 (555) 000-1111 ").unwrap(),
            "+15550001111"
        );
        assert_eq!(validate_phone_number("+442071838750").unwrap(), "+442071838750");
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(validate_phone_number("").is_err());
        assert!(validate_phone_number("5550001111").is_err());
        assert!(validate_phone_number("+05550001111").is_err());
        assert!(validate_phone_number("+1555000111122223").is_err());
        assert!(validate_phone_number("+1555abc1111").is_err());
    }
}
