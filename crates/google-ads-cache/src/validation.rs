//! Input normalization and validation for Google Ads request parameters

use chrono::NaiveDate;

use crate::Error;

/// Number of digits in a canonical Google Ads customer id
pub const CUSTOMER_ID_DIGITS: usize = 10;

/// Canonical date format used in cache keys and remote requests
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepted input date formats, tried in order
const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Strip every non-digit character from a customer id.
///
/// `"123-456-7890"`, `" 123 456 7890 "` and `"1234567890"` all normalize to
/// `"1234567890"`.
#[must_use]
pub fn normalize_customer_id(customer_id: &str) -> String {
    customer_id.chars().filter(char::is_ascii_digit).collect()
}

/// Normalize and validate a customer id (10 digits after normalization).
pub fn validate_customer_id(customer_id: &str) -> Result<String, Error> {
    let normalized = normalize_customer_id(customer_id);

    if normalized.len() != CUSTOMER_ID_DIGITS {
        return Err(Error::InvalidInput(format!(
            "customer id '{customer_id}' must contain exactly {CUSTOMER_ID_DIGITS} digits"
        )));
    }

    Ok(normalized)
}

/// Parse a date in one of the accepted input formats.
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Parse a date, failing with a descriptive error.
pub fn validate_date(value: &str, field: &str) -> Result<NaiveDate, Error> {
    parse_date(value).ok_or_else(|| {
        Error::InvalidInput(format!("{field} '{value}' is not a valid date (YYYY-MM-DD)"))
    })
}

/// Validate that `start` does not come after `end`.
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), Error> {
    if start > end {
        return Err(Error::InvalidInput(format!(
            "start date {} is after end date {}",
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_customer_id_strips_dashes() {
        assert_eq!(normalize_customer_id("123-456-7890"), "1234567890");
    }

    #[test]
    fn test_normalize_customer_id_strips_whitespace_and_symbols() {
        assert_eq!(normalize_customer_id(" 123 456.7890 "), "1234567890");
    }

    #[test]
    fn test_normalize_customer_id_already_canonical() {
        assert_eq!(normalize_customer_id("1234567890"), "1234567890");
    }

    #[test]
    fn test_validate_customer_id_valid() {
        assert_eq!(validate_customer_id("123-456-7890").unwrap(), "1234567890");
    }

    #[test]
    fn test_validate_customer_id_too_short() {
        let err = validate_customer_id("123-456").unwrap_err();
        assert!(err.to_string().contains("10 digits"));
    }

    #[test]
    fn test_validate_customer_id_empty() {
        assert!(validate_customer_id("").is_err());
        assert!(validate_customer_id("---").is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(parse_date("2025-01-07"), Some(expected));
        assert_eq!(parse_date("2025/01/07"), Some(expected));
        assert_eq!(parse_date("20250107"), Some(expected));
        assert_eq!(parse_date(" 2025-01-07 "), Some(expected));
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date("LAST_7_DAYS").is_none());
        assert!(parse_date("2025-13-01").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_validate_date_error_names_field() {
        let err = validate_date("nope", "start_date").unwrap_err();
        assert!(err.to_string().contains("start_date"));
    }

    #[test]
    fn test_validate_date_range() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert!(validate_date_range(a, b).is_ok());
        assert!(validate_date_range(a, a).is_ok());
        assert!(validate_date_range(b, a).is_err());
    }
}
