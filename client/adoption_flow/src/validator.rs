//! Token amount validation.
//!
//! The adopt surface takes a free-form numeric input; the confirm control
//! is enabled only while the current input is a positive whole number of
//! tokens. Validation is pure and re-run on every edit.

/// Outcome of validating a raw amount input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub valid: bool,
}

/// Parse a raw amount input into a token count.
///
/// Returns `None` for anything that is not a finite positive integer:
/// zero, negatives, fractions, exponent notation, non-numeric text, and
/// empty input are all rejected.
pub fn parse_amount(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u32>() {
        Ok(n) if n >= 1 => Some(n),
        _ => None,
    }
}

/// Validate a raw amount input. The result gates the confirm control.
pub fn validate(raw: &str) -> Validity {
    Validity {
        valid: parse_amount(raw).is_some(),
    }
}
