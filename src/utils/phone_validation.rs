//! Phone number validation for PSTN call targets.
//!
//! ACS addresses PSTN participants by E.164 number (`+` followed by up to 15
//! digits). Operators often paste numbers with spaces, dashes or brackets, so
//! those separators are stripped before checking.

/// Maximum digits in an E.164 number, country code included
const E164_MAX_DIGITS: usize = 15;

/// Validates and normalizes a phone number to E.164.
///
/// # Validation Rules
///
/// - Must not be empty (after trimming whitespace)
/// - Must start with `+`
/// - Spaces, `-`, `.`, `(` and `)` are ignored
/// - Everything else after the `+` must be digits, 7 to 15 of them
///
/// # Examples
///
/// ```
/// use acs_voice_agent::utils::phone_validation::validate_phone_number;
///
/// assert_eq!(validate_phone_number("+1 (425) 555-0123").unwrap(), "+14255550123");
/// assert!(validate_phone_number("4255550123").is_err());
/// assert!(validate_phone_number("+1425abc").is_err());
/// ```
pub fn validate_phone_number(phone: &str) -> Result<String, String> {
    let trimmed = phone.trim();

    if trimmed.is_empty() {
        return Err("Phone number cannot be empty".to_string());
    }

    let Some(rest) = trimmed.strip_prefix('+') else {
        return Err(format!(
            "Phone number '{trimmed}' must be in E.164 format with a leading '+'"
        ));
    };

    let mut digits = String::with_capacity(rest.len());
    for (i, ch) in rest.chars().enumerate() {
        match ch {
            '0'..='9' => digits.push(ch),
            ' ' | '-' | '.' | '(' | ')' => {}
            other => {
                return Err(format!(
                    "Invalid character '{other}' at position {} - only digits are allowed after '+'",
                    i + 1
                ));
            }
        }
    }

    if digits.len() < 7 || digits.len() > E164_MAX_DIGITS {
        return Err(format!(
            "Phone number must contain between 7 and {E164_MAX_DIGITS} digits, got {}",
            digits.len()
        ));
    }

    Ok(format!("+{digits}"))
}
