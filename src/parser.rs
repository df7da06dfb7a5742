// src/parser.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Format the backend uses for counter timestamps.
pub const BACKEND_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse a counter timestamp.
///
/// Accepts `"YYYY-MM-DD HH:MM:SS"` and ISO-8601. Offsets are folded into UTC,
/// local forms are taken as-is. A bare date is midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = if trimmed.contains('T') {
        trimmed.to_string()
    } else {
        trimmed.replacen(' ', "T", 1)
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.naive_utc());
    }

    for fmt in LOCAL_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Render a timestamp the way the backend stores it.
pub fn to_backend_datetime(dt: NaiveDateTime) -> String {
    dt.format(BACKEND_DATETIME).to_string()
}

/// Parse a user-typed reading time (`2024-05-01 10:30`, `2024-05-01T10:30:15`...).
pub fn parse_datetime_input(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(to_backend_datetime)
}

/// Calendar day of a stored timestamp as written, offset ignored.
///
/// `None` unless the whole value is a readable timestamp.
pub fn written_day(raw: &str) -> Option<NaiveDate> {
    parse_timestamp(raw)?;
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Parse a number the way a loose form field would: trimmed, empty is zero.
pub fn parse_number(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(Decimal::ZERO);
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Decode any JSON value as a decimal, `None` when it is not numeric.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Null => Some(Decimal::ZERO),
        Value::Bool(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
        Value::Number(n) => parse_number(&n.to_string()),
        Value::String(s) => parse_number(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Decode a JSON value as an id; numeric strings are accepted.
pub fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// serde helper: meter amounts, anything non-numeric is zero.
pub fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(decimal_from_value)
        .unwrap_or(Decimal::ZERO))
}

/// serde helper: optional numbers, non-numeric and null are `None`.
pub fn lenient_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(v) => decimal_from_value(&v),
    })
}

/// serde helper: ids that may arrive as strings.
pub fn lenient_opt_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|d| d.and_hms_opt(h, min, s))
            .unwrap()
    }

    #[test]
    fn backend_and_iso_forms_parse_to_same_instant() {
        let expected = at(2024, 5, 1, 10, 30, 0);
        assert_eq!(parse_timestamp("2024-05-01 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T10:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T05:30:00-05:00"), Some(expected));
    }

    #[test]
    fn fractional_seconds_and_bare_dates() {
        let ts = parse_timestamp("2024-05-01T10:30:00.250").unwrap();
        assert_eq!(ts.format("%H:%M:%S%.3f").to_string(), "10:30:00.250");
        assert_eq!(parse_timestamp("2024-05-01"), Some(at(2024, 5, 1, 0, 0, 0)));
    }

    #[test]
    fn garbage_timestamps_are_rejected() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("ayer"), None);
        assert_eq!(parse_timestamp("2024-13-01 10:00:00"), None);
    }

    #[test]
    fn datetime_input_is_normalized_for_backend() {
        assert_eq!(
            parse_datetime_input("2024-05-01T10:30").as_deref(),
            Some("2024-05-01 10:30:00")
        );
        assert_eq!(
            parse_datetime_input("2024-05-01 10:30:15").as_deref(),
            Some("2024-05-01 10:30:15")
        );
        assert_eq!(parse_datetime_input("10:30"), None);
    }

    #[test]
    fn written_day_keeps_the_local_calendar_day() {
        let raw = "2024-05-10T22:30:00-05:00";
        assert_eq!(parse_timestamp(raw).map(|t| t.date()), NaiveDate::from_ymd_opt(2024, 5, 11));
        assert_eq!(written_day(raw), NaiveDate::from_ymd_opt(2024, 5, 10));
        assert_eq!(written_day("2024-05-10 08:00:00"), NaiveDate::from_ymd_opt(2024, 5, 10));
        assert_eq!(written_day("2024-05-10 garbage"), None);
        assert_eq!(written_day("10:30"), None);
    }

    #[test]
    fn numbers_decode_leniently() {
        assert_eq!(decimal_from_value(&serde_json::json!(180)), Some(dec("180")));
        assert_eq!(decimal_from_value(&serde_json::json!(12.5)), Some(dec("12.5")));
        assert_eq!(decimal_from_value(&serde_json::json!(" 42 ")), Some(dec("42")));
        assert_eq!(decimal_from_value(&serde_json::json!("")), Some(Decimal::ZERO));
        assert_eq!(decimal_from_value(&Value::Null), Some(Decimal::ZERO));
        assert_eq!(decimal_from_value(&serde_json::json!(true)), Some(Decimal::ONE));
        assert_eq!(decimal_from_value(&serde_json::json!("abc")), None);
        assert_eq!(decimal_from_value(&serde_json::json!([1])), None);
        assert_eq!(parse_number("1e3"), Some(dec("1000")));
    }

    #[test]
    fn ids_accept_numeric_strings() {
        assert_eq!(id_from_value(&serde_json::json!(7)), Some(7));
        assert_eq!(id_from_value(&serde_json::json!("7")), Some(7));
        assert_eq!(id_from_value(&serde_json::json!("x7")), None);
        assert_eq!(id_from_value(&serde_json::json!(7.5)), None);
    }
}
