use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schema::ColumnType;

/// Date patterns tried during inference and coercion, narrowest first.
///
/// ISO 8601 leads; the remaining variants are unambiguous year-first or
/// named-month forms. Day-first/month-first slash dates (`11/08/2016`) are
/// deliberately absent: they cannot be told apart, so such columns widen
/// to string.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d-%b-%Y"];

/// Datetime patterns, seconds precision, no timezone designator.
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// One cell of a record: a closed tagged variant over the six semantic
/// types. Null is `Option<Value>::None` at the record level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    String(String),
}

impl Value {
    /// Canonical textual form used by the XML serializer: ISO 8601 for
    /// temporal types, minimal decimal form for floats, `true`/`false`
    /// for booleans. The same value always renders identically.
    pub fn canonical_text(&self) -> String {
        match self {
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            // f64 Display is the shortest round-tripping decimal form and
            // never uses exponent notation, which keeps xs:decimal happy.
            Value::Float(f) => f.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Value::String(s) => s.clone(),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Date(_) => ColumnType::Date,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::String(_) => ColumnType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_text())
    }
}

pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_integer(value: &str) -> Option<i64> {
    value.parse::<i64>().ok()
}

pub fn parse_float(value: &str) -> Option<f64> {
    // `f64::from_str` accepts "inf"/"NaN"; those are not tabular numbers.
    value.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Parse one raw cell under a declared column type. The inner `Option` is
/// the null position (empty input); the outer `None` means the cell does
/// not conform to the type, and the caller chooses between widening
/// (inference) and the string fallback (import).
pub fn parse_typed(value: &str, ty: &ColumnType) -> Option<Option<Value>> {
    if value.is_empty() {
        return Some(None);
    }
    let parsed = match ty {
        ColumnType::Boolean => Value::Boolean(parse_boolean(value)?),
        ColumnType::Integer => Value::Integer(parse_integer(value)?),
        ColumnType::Float => Value::Float(parse_float(value)?),
        ColumnType::Date => Value::Date(parse_naive_date(value)?),
        ColumnType::DateTime => Value::DateTime(parse_naive_datetime(value)?),
        ColumnType::String => Value::String(value.to_string()),
    };
    Some(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_tokens_parse_case_insensitively() {
        assert_eq!(parse_boolean("Yes"), Some(true));
        assert_eq!(parse_boolean("0"), Some(false));
        assert_eq!(parse_boolean("maybe"), None);
    }

    #[test]
    fn float_rejects_non_finite_tokens() {
        assert_eq!(parse_float("2.5"), Some(2.5));
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float("inf"), None);
        assert_eq!(parse_float("NaN"), None);
    }

    #[test]
    fn date_formats_accept_iso_and_reject_ambiguous_slash_forms() {
        let expected = NaiveDate::from_ymd_opt(2016, 8, 11).unwrap();
        assert_eq!(parse_naive_date("2016-08-11"), Some(expected));
        assert_eq!(parse_naive_date("2016/08/11"), Some(expected));
        assert_eq!(parse_naive_date("11-Aug-2016"), Some(expected));
        assert_eq!(parse_naive_date("11/08/2016"), None);
    }

    #[test]
    fn datetime_formats_accept_t_and_space_separators() {
        let expected =
            NaiveDateTime::parse_from_str("2024-05-06 14:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(parse_naive_datetime("2024-05-06T14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("2024-05-06 14:30:00"), Some(expected));
        assert_eq!(parse_naive_datetime("2024-05-06 14:30"), Some(expected));
    }

    #[test]
    fn canonical_text_is_stable() {
        assert_eq!(Value::Float(3.0).canonical_text(), "3");
        assert_eq!(Value::Float(2.5).canonical_text(), "2.5");
        assert_eq!(Value::Boolean(true).canonical_text(), "true");
        let dt = parse_naive_datetime("2024-05-06 14:30:00").unwrap();
        assert_eq!(
            Value::DateTime(dt).canonical_text(),
            "2024-05-06T14:30:00"
        );
    }

    #[test]
    fn parse_typed_treats_empty_as_null() {
        assert_eq!(parse_typed("", &ColumnType::Integer), Some(None));
        assert_eq!(
            parse_typed("7", &ColumnType::Integer),
            Some(Some(Value::Integer(7)))
        );
        assert_eq!(parse_typed("abc", &ColumnType::Integer), None);
    }
}
