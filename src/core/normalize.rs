//! Conversion of German-formatted page text into canonical values.
//!
//! The strict `parse_*` functions return a [`HarvestError::Normalization`] on bad input.
//! The `*_field` wrappers are what the harvesters use: they never fail, they log a warning
//! and yield `None` so that a single bad field cannot abort a record.

use crate::core::error::HarvestError;
use chrono::NaiveDate;
use tracing::warn;

/// Placeholders the source renders for "no value". They normalize to zero.
const DASH_SENTINELS: [&str; 3] = ["\u{2014}", "\u{2013}", "-"];

const NBSP: char = '\u{a0}';

/// Layout of release dates, e.g. `02.01.06` for 2 January 2006.
const DATE_FORMAT: &str = "%d.%m.%y";

fn is_sentinel(value: &str) -> bool {
    DASH_SENTINELS.contains(&value)
}

/// Trims, drops non-breaking spaces and a trailing percent sign, and turns a German
/// decimal number into one `f32::from_str` understands.
fn clean_decimal(raw: &str) -> String {
    let mut value = raw.trim().replace(NBSP, "");
    if let Some(stripped) = value.strip_suffix('%') {
        value = stripped.trim_end().to_string();
    }
    if value.contains(',') {
        // `1.234,5` uses `.` for thousands
        value = value.replace('.', "").replace(',', ".");
    }
    value
}

fn parse_f32(field: &'static str, raw: &str) -> Result<f32, HarvestError> {
    let value = clean_decimal(raw);
    if is_sentinel(&value) {
        return Ok(0.0);
    }
    let parsed = value
        .parse::<f32>()
        .map_err(|e| HarvestError::Normalization {
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
    if !parsed.is_finite() {
        return Err(HarvestError::Normalization {
            field,
            value: raw.to_string(),
            reason: "not a finite number".to_string(),
        });
    }
    Ok(parsed)
}

/// Parses a percentage such as `12,34 %` into the fraction `0.1234`.
pub fn parse_percent(field: &'static str, raw: &str) -> Result<f32, HarvestError> {
    Ok(parse_f32(field, raw)? / 100.0)
}

/// Parses a plain German decimal such as `0,85`.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<f32, HarvestError> {
    parse_f32(field, raw)
}

/// Parses an integer with `.` thousands separators, e.g. `1.432`.
pub fn parse_count(field: &'static str, raw: &str) -> Result<i64, HarvestError> {
    let value: String = raw
        .trim()
        .chars()
        .filter(|c| *c != NBSP && *c != '.' && !c.is_whitespace())
        .collect();
    if is_sentinel(&value) {
        return Ok(0);
    }
    value.parse::<i64>().map_err(|e| HarvestError::Normalization {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Parses a `DD.MM.YY` date into a calendar date.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, HarvestError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|e| {
        HarvestError::Normalization {
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Parses a literal flag. Accepts `true`/`false` and the German `Ja`/`Nein`.
pub fn parse_flag(field: &'static str, raw: &str) -> Result<bool, HarvestError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "ja" => Ok(true),
        "false" | "nein" => Ok(false),
        other => Err(HarvestError::Normalization {
            field,
            value: other.to_string(),
            reason: "expected true/false or Ja/Nein".to_string(),
        }),
    }
}

/// Trimmed free text. Blank text and dash placeholders become `None`.
pub fn text_field(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim().trim_matches(NBSP).trim();
    if value.is_empty() || is_sentinel(value) {
        None
    } else {
        Some(value.to_string())
    }
}

fn lenient<T>(
    field: &'static str,
    raw: Option<&str>,
    parse: impl Fn(&'static str, &str) -> Result<T, HarvestError>,
) -> Option<T> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    match parse(field, raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}

pub fn percent_field(field: &'static str, raw: Option<&str>) -> Option<f32> {
    lenient(field, raw, parse_percent)
}

pub fn decimal_field(field: &'static str, raw: Option<&str>) -> Option<f32> {
    lenient(field, raw, parse_decimal)
}

pub fn count_field(field: &'static str, raw: Option<&str>) -> Option<i64> {
    lenient(field, raw, parse_count)
}

pub fn date_field(field: &'static str, raw: Option<&str>) -> Option<NaiveDate> {
    lenient(field, raw, parse_date)
}

pub fn flag_field(field: &'static str, raw: Option<&str>) -> Option<bool> {
    lenient(field, raw, parse_flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_parse_percent_german_decimal() {
        assert_close(parse_percent("ter", "12,34%").unwrap(), 0.1234);
        assert_close(parse_percent("ter", "12,34\u{a0}%").unwrap(), 0.1234);
        assert_close(parse_percent("ter", "  0,22 % ").unwrap(), 0.0022);
        assert_close(parse_percent("ter", "-3,5%").unwrap(), -0.035);
        assert_close(parse_percent("ter", "1.050,0%").unwrap(), 10.5);
    }

    #[test]
    fn test_dash_sentinel_is_zero() {
        assert_eq!(parse_percent("ter", "\u{2014}").unwrap(), 0.0);
        assert_eq!(parse_percent("ter", "\u{2014}\u{a0}%").unwrap(), 0.0);
        assert_eq!(parse_decimal("sharpe", "-").unwrap(), 0.0);
        assert_eq!(parse_count("positions", "\u{2013}").unwrap(), 0);
    }

    #[test]
    fn test_parse_percent_rejects_text() {
        let err = parse_percent("ter", "n/a").unwrap_err();
        assert!(matches!(
            err,
            HarvestError::Normalization { field: "ter", .. }
        ));
    }

    #[test]
    fn test_non_finite_numbers_are_rejected() {
        for raw in ["NaN %", "inf", "-infinity", "NaN"] {
            let err = parse_percent("ter", raw).unwrap_err();
            assert!(
                matches!(err, HarvestError::Normalization { field: "ter", .. }),
                "accepted {raw}"
            );
        }
        assert!(parse_decimal("sharpe", "inf").is_err());
    }

    #[test]
    fn test_parse_decimal() {
        assert_close(parse_decimal("sharpe", "0,85").unwrap(), 0.85);
        assert_close(parse_decimal("sharpe", "-1,2").unwrap(), -1.2);
    }

    #[test]
    fn test_parse_count_strips_thousands_separator() {
        assert_eq!(parse_count("positions", "1.432").unwrap(), 1432);
        assert_eq!(parse_count("positions", " 250 ").unwrap(), 250);
        assert!(parse_count("positions", "viele").is_err());
    }

    #[test]
    fn test_parse_date_two_digit_year() {
        let date = parse_date("release_date", "02.01.06").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2006, 1, 2).unwrap());

        let date = parse_date("release_date", "25.09.09").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2009, 9, 25).unwrap());

        assert!(parse_date("release_date", "2006-01-02").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("hedged", "true").unwrap());
        assert!(parse_flag("hedged", "Ja").unwrap());
        assert!(!parse_flag("hedged", "Nein").unwrap());
        assert!(parse_flag("hedged", "vielleicht").is_err());
    }

    #[test]
    fn test_text_field() {
        assert_eq!(text_field(Some("  MSCI World ")), Some("MSCI World".to_string()));
        assert_eq!(text_field(Some("\u{2014}")), None);
        assert_eq!(text_field(Some("   ")), None);
        assert_eq!(text_field(None), None);
    }

    #[test]
    fn test_lenient_fields_swallow_failures() {
        assert_eq!(percent_field("ter", Some("abc")), None);
        assert_eq!(percent_field("ter", None), None);
        assert_eq!(percent_field("ter", Some("")), None);
        assert_eq!(date_field("release_date", Some("31.02.20")), None);
        assert_eq!(count_field("positions", Some("1.601")), Some(1601));
        assert_eq!(flag_field("hedged", Some("false")), Some(false));
        assert_close(decimal_field("sharpe", Some("0,5")).unwrap(), 0.5);
    }
}
