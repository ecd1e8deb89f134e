use crate::error::{AlmoxError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Stored in place of an issue date the operator left blank.
pub const NO_DATE: &str = "SEM DATA";

static ISSUE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}) (\d{2})/(\d{2})/(\d{2})$").expect("static issue date pattern")
});

/// Parses a decimal typed by the operator. Accepts either `.` or `,` as the
/// decimal separator (but not both).
pub fn parse_decimal(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AlmoxError::validation("A number is required"));
    }
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replacen(',', ".", 1)
    } else {
        trimmed.to_string()
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AlmoxError::validation(format!("'{}' is not a valid number", trimmed)))
}

pub fn require_positive(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AlmoxError::validation(format!(
            "{} must be a positive number (got {})",
            field, value
        )))
    }
}

pub fn require_non_negative(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(AlmoxError::validation(format!(
            "{} must be zero or a positive number (got {})",
            field, value
        )))
    }
}

pub fn require_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AlmoxError::validation(format!("{} cannot be empty", field)))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trims an optional free-text field, mapping blank to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validates an `HH:MM DD/MM/YY` issue date. Blank input yields [`NO_DATE`].
pub fn issue_date(input: Option<&str>) -> Result<String> {
    let Some(text) = optional_text(input) else {
        return Ok(NO_DATE.to_string());
    };

    let invalid = || {
        AlmoxError::validation(format!(
            "Invalid issue date '{}': expected HH:MM DD/MM/YY",
            text
        ))
    };

    let (hour, minute, day, month) = {
        let caps = ISSUE_DATE.captures(&text).ok_or_else(invalid)?;
        let field = |i: usize| -> u32 { caps[i].parse().unwrap_or(u32::MAX) };
        (field(1), field(2), field(3), field(4))
    };

    if hour > 23 || minute > 59 || !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dot_and_comma_decimals() {
        assert_eq!(parse_decimal("2.50").unwrap(), 2.5);
        assert_eq!(parse_decimal(" 2,5 ").unwrap(), 2.5);
        assert!(parse_decimal("1.000,50").is_err());
        assert!(parse_decimal("abc").is_err());
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal("NaN").is_err());
    }

    #[test]
    fn positive_and_non_negative_bounds() {
        assert!(require_positive("Quantity", 0.0).is_err());
        assert!(require_positive("Quantity", -1.0).is_err());
        assert_eq!(require_positive("Quantity", 0.5).unwrap(), 0.5);
        assert_eq!(require_non_negative("Quantity", 0.0).unwrap(), 0.0);
        assert!(require_non_negative("Quantity", f64::INFINITY).is_err());
    }

    #[test]
    fn blank_issue_date_is_sentinel() {
        assert_eq!(issue_date(None).unwrap(), NO_DATE);
        assert_eq!(issue_date(Some("   ")).unwrap(), NO_DATE);
    }

    #[test]
    fn accepts_well_formed_issue_date() {
        assert_eq!(issue_date(Some("08:15 31/12/24")).unwrap(), "08:15 31/12/24");
        assert_eq!(issue_date(Some(" 00:00 01/01/25 ")).unwrap(), "00:00 01/01/25");
    }

    #[test]
    fn rejects_out_of_range_or_malformed_dates() {
        for bad in [
            "24:00 01/01/25",
            "12:60 01/01/25",
            "12:00 00/01/25",
            "12:00 32/01/25",
            "12:00 10/13/25",
            "12:00 10/00/25",
            "1:00 01/01/25",
            "12:00 01/01/2025",
            "12:00",
        ] {
            assert!(issue_date(Some(bad)).is_err(), "accepted {}", bad);
        }
    }
}
