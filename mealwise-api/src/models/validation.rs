//! Field-level validation for request DTOs
//!
//! Unknown fields are rejected by serde (`deny_unknown_fields`) before a
//! DTO reaches [`Validate::validate`]; this module covers range, length
//! and presence rules.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A single failed field rule
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Implemented by every request DTO
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Required text: non-blank after trimming and at most `max` characters
pub fn require_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be blank"));
    }
    optional_text(field, Some(value), max)
}

/// Optional text: when present, at most `max` characters
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<(), ValidationError> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max),
        )),
        _ => Ok(()),
    }
}

/// Optional integer within an inclusive range
pub fn optional_range(
    field: &str,
    value: Option<i64>,
    min: i64,
    max: i64,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if v < min || v > max => Err(ValidationError::new(
            field,
            format!("must be between {} and {}", min, max),
        )),
        _ => Ok(()),
    }
}

/// Optional quantity: finite and non-negative
pub fn optional_quantity(field: &str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => {
            Err(ValidationError::new(field, "must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

/// Collection size limit
pub fn max_items<T>(field: &str, items: &[T], max: usize) -> Result<(), ValidationError> {
    if items.len() > max {
        return Err(ValidationError::new(
            field,
            format!("must contain at most {} items", max),
        ));
    }
    Ok(())
}

/// Absolute http(s) URL
pub fn http_url(field: &str, value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some() => {
            Ok(())
        }
        _ => Err(ValidationError::new(field, "must be an absolute http(s) URL")),
    }
}

/// Single `@` with non-empty local and domain parts, domain containing a dot
pub fn email(field: &str, value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    let mut parts = value.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        _ => false,
    };
    if !valid || value.len() > 254 {
        return Err(ValidationError::new(field, "must be a valid email address"));
    }
    Ok(())
}

static TIMEZONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(UTC|[A-Za-z]+(/[A-Za-z0-9_+\-]+){1,2})$").expect("valid regex"));

/// IANA-style zone name (`UTC`, `Europe/Paris`, `America/Argentina/Salta`)
pub fn timezone(field: &str, value: &str) -> Result<(), ValidationError> {
    if TIMEZONE_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(field, "must be an IANA time zone name such as Europe/Paris"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text() {
        assert!(require_text("title", "Soup", 10).is_ok());
        assert!(require_text("title", "   ", 10).is_err());
        assert!(require_text("title", "a very long title", 5).is_err());
    }

    #[test]
    fn test_optional_range() {
        assert!(optional_range("servings", None, 1, 100).is_ok());
        assert!(optional_range("servings", Some(4), 1, 100).is_ok());
        let err = optional_range("servings", Some(0), 1, 100).unwrap_err();
        assert_eq!(err.field, "servings");
        assert_eq!(err.to_string(), "servings: must be between 1 and 100");
    }

    #[test]
    fn test_optional_quantity() {
        assert!(optional_quantity("q", Some(0.0)).is_ok());
        assert!(optional_quantity("q", Some(-0.5)).is_err());
        assert!(optional_quantity("q", Some(f64::NAN)).is_err());
        assert!(optional_quantity("q", Some(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_email() {
        assert!(email("email", "cook@example.com").is_ok());
        assert!(email("email", "cook@example").is_err());
        assert!(email("email", "@example.com").is_err());
        assert!(email("email", "a@b@c.com").is_err());
        assert!(email("email", "a b@c.com").is_err());
    }

    #[test]
    fn test_http_url() {
        assert!(http_url("u", "https://example.com/recipe").is_ok());
        assert!(http_url("u", "ftp://example.com").is_err());
        assert!(http_url("u", "not a url").is_err());
    }

    #[test]
    fn test_timezone() {
        assert!(timezone("tz", "UTC").is_ok());
        assert!(timezone("tz", "Europe/Paris").is_ok());
        assert!(timezone("tz", "America/Argentina/Salta").is_ok());
        assert!(timezone("tz", "Mars").is_err());
        assert!(timezone("tz", "Europe/Paris; DROP").is_err());
    }
}
