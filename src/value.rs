use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use log::warn;
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value as stored in the table, before any editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Storage type the editor cannot represent (e.g. a blob).
    Unsupported(String),
}

impl RawValue {
    pub fn text(value: impl Into<String>) -> Self {
        RawValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// True for nulls and for values whose canonical form is blank.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null | RawValue::Unsupported(_) => true,
            RawValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RawValue::Date(date) => Some(*date),
            RawValue::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", normalize(self))
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Integer(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(value: NaiveDateTime) -> Self {
        RawValue::Timestamp(value)
    }
}

impl<T> From<Option<T>> for RawValue
where
    T: Into<RawValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// Canonical string form used for comparison and for populating edit fields.
///
/// Date columns drop any time of day while timestamp columns keep their full
/// default form (microseconds only when non-zero). Never fails: values the
/// editor cannot represent become an empty string.
pub fn normalize(value: &RawValue) -> String {
    match value {
        RawValue::Null => String::new(),
        RawValue::Text(text) => text.trim().to_string(),
        RawValue::Integer(i) => i.to_string(),
        RawValue::Real(f) => format_real(*f),
        RawValue::Date(date) => date.format(DATE_FORMAT).to_string(),
        RawValue::Timestamp(ts) => format_timestamp(ts),
        RawValue::Unsupported(type_name) => {
            warn!("Cannot normalize value of type '{type_name}'; treating it as empty");
            String::new()
        }
    }
}

fn format_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    let base = ts.format(TIMESTAMP_FORMAT).to_string();
    let micros = ts.nanosecond() % 1_000_000_000 / 1_000;
    if micros == 0 {
        base
    } else {
        format!("{base}.{micros:06}")
    }
}

/// Strict `YYYY-MM-DD` parse.
pub fn parse_strict_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Parses an edited date, falling back to `today` on blank or malformed input.
pub fn parse_edit_date(value: &str, today: NaiveDate) -> NaiveDate {
    parse_strict_date(value).unwrap_or(today)
}

pub fn parse_edit_date_or_today(value: &str) -> NaiveDate {
    parse_edit_date(value, today())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let trimmed = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn normalize_handles_nulls_and_whitespace() {
        assert_eq!(normalize(&RawValue::Null), "");
        assert_eq!(normalize(&RawValue::text("  Smith \t")), "Smith");
        assert_eq!(normalize(&RawValue::Integer(42)), "42");
        assert_eq!(normalize(&RawValue::Unsupported("blob".into())), "");
    }

    #[test]
    fn normalize_keeps_time_only_for_timestamps() {
        let dob = RawValue::Date(date(2000, 1, 1));
        assert_eq!(normalize(&dob), "2000-01-01");

        let stamped = date(2024, 3, 9).and_hms_opt(14, 5, 7).unwrap();
        assert_eq!(
            normalize(&RawValue::Timestamp(stamped)),
            "2024-03-09 14:05:07"
        );

        let fractional = date(2024, 3, 9).and_hms_micro_opt(14, 5, 7, 250).unwrap();
        assert_eq!(
            normalize(&RawValue::Timestamp(fractional)),
            "2024-03-09 14:05:07.000250"
        );
    }

    #[test]
    fn normalize_real_matches_default_float_form() {
        assert_eq!(normalize(&RawValue::Real(3.0)), "3.0");
        assert_eq!(normalize(&RawValue::Real(2.5)), "2.5");
    }

    #[test]
    fn parse_edit_date_falls_back_to_today() {
        let today = date(2026, 10, 18);
        assert_eq!(parse_edit_date("1999-12-31", today), date(1999, 12, 31));
        assert_eq!(parse_edit_date("", today), today);
        assert_eq!(parse_edit_date("31/12/1999", today), today);
        assert_eq!(parse_edit_date("2023-02-30", today), today);
    }

    #[test]
    fn parse_naive_datetime_accepts_sqlite_forms() {
        let expected = date(2024, 5, 6).and_hms_opt(14, 30, 0).unwrap();
        assert_eq!(parse_naive_datetime("2024-05-06 14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("2024-05-06T14:30"), Some(expected));
        assert_eq!(parse_naive_datetime("yesterday"), None);
    }
}
