//! Value conversion between JSON and engine representations.

use crate::error::{DbError, DbResult};
use crate::models::{AbstractType, QueryParam};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

/// Output format for datetime values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output format for date-only values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A parsed temporal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS[.fff]` or ISO-8601 with an
/// optional `T`, `Z` or UTC offset.
///
/// Values carrying an offset are converted to UTC.
pub fn parse_datetime(input: &str) -> Option<Temporal> {
    let s = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(Temporal::Date(date));
    }
    for format in DATETIME_INPUT_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Temporal::DateTime(dt));
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| Temporal::DateTime(dt.naive_utc()))
}

impl Temporal {
    pub fn format(&self) -> String {
        match self {
            Self::Date(d) => d.format(DATE_FORMAT).to_string(),
            Self::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        }
    }
}

/// Classify an engine type name into an abstract type.
pub fn classify_native_type(native: &str) -> AbstractType {
    let t = native.trim().to_lowercase();
    let compact: String = t.chars().filter(|c| !c.is_whitespace()).collect();

    if t.starts_with("bool")
        || t == "bit"
        || compact == "tinyint(1)"
        || compact == "number(1)"
        || compact == "number(1,0)"
    {
        return AbstractType::Boolean;
    }
    if t.contains("blob") || t.contains("binary") || t == "bytea" || t.starts_with("image") || t.starts_with("raw") || t.starts_with("long raw") {
        return AbstractType::Binary;
    }
    if t.contains("char") || t.contains("text") || t.contains("clob") || t.starts_with("json") || t.starts_with("uuid") || t.starts_with("enum") || t.starts_with("set(") {
        return AbstractType::Text;
    }
    if t.starts_with("date") || t.starts_with("time") || t.contains("timestamp") {
        return AbstractType::Datetime;
    }
    if t.starts_with("number") {
        // NUMBER(p,0) stores integers; bare NUMBER and NUMBER(p,s) are exact decimals
        return match compact.strip_prefix("number(").and_then(|r| r.strip_suffix(')')) {
            Some(args) if args.split(',').nth(1).is_none_or(|s| s == "0") => AbstractType::Integer,
            _ => AbstractType::Decimal,
        };
    }
    if t.contains("int") || t.contains("serial") {
        return AbstractType::Integer;
    }
    if t.starts_with("dec")
        || t.starts_with("numeric")
        || t.contains("float")
        || t.contains("double")
        || t == "real"
        || t.contains("money")
    {
        return AbstractType::Decimal;
    }
    AbstractType::Text
}

/// Convert a caller-supplied JSON value to a bind value for a column of `abstract_type`.
pub fn to_param(column: &str, abstract_type: AbstractType, value: &JsonValue) -> DbResult<QueryParam> {
    if value.is_null() {
        return Ok(QueryParam::Null);
    }
    let fail = |expected: &str| {
        Err(DbError::invalid_column_value(
            column,
            format!("expected {}, got {}", expected, value),
        ))
    };

    match abstract_type {
        AbstractType::Text => Ok(match value {
            JsonValue::String(s) => QueryParam::String(s.clone()),
            JsonValue::Bool(b) => QueryParam::String(b.to_string()),
            JsonValue::Number(n) => QueryParam::String(n.to_string()),
            other => QueryParam::String(other.to_string()),
        }),
        AbstractType::Integer => match value {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(QueryParam::Int(i))
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Ok(QueryParam::Int(f as i64))
                        }
                        _ => fail("an integer"),
                    }
                }
            }
            JsonValue::String(s) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(QueryParam::Int(i)),
                Err(_) => fail("an integer"),
            },
            JsonValue::Bool(b) => Ok(QueryParam::Int(i64::from(*b))),
            _ => fail("an integer"),
        },
        AbstractType::Decimal => match value {
            JsonValue::Number(n) => Ok(QueryParam::Decimal(n.to_string())),
            JsonValue::String(s) => {
                let trimmed = s.trim();
                if is_decimal_literal(trimmed) {
                    Ok(QueryParam::Decimal(trimmed.to_string()))
                } else {
                    fail("a decimal number")
                }
            }
            _ => fail("a decimal number"),
        },
        AbstractType::Boolean => match value {
            JsonValue::Bool(b) => Ok(QueryParam::Bool(*b)),
            JsonValue::Number(n) => match n.as_i64() {
                Some(0) => Ok(QueryParam::Bool(false)),
                Some(1) => Ok(QueryParam::Bool(true)),
                _ => fail("a boolean"),
            },
            JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "on" => Ok(QueryParam::Bool(true)),
                "false" | "f" | "no" | "n" | "0" | "off" => Ok(QueryParam::Bool(false)),
                _ => fail("a boolean"),
            },
            _ => fail("a boolean"),
        },
        AbstractType::Datetime => match value {
            JsonValue::String(s) => match parse_datetime(s) {
                Some(Temporal::Date(d)) => Ok(QueryParam::Date(d)),
                Some(Temporal::DateTime(dt)) => Ok(QueryParam::DateTime(dt)),
                None => fail("a date (YYYY-MM-DD) or datetime (YYYY-MM-DD HH:MM:SS)"),
            },
            _ => fail("a date (YYYY-MM-DD) or datetime (YYYY-MM-DD HH:MM:SS)"),
        },
        AbstractType::Binary => match value {
            JsonValue::String(s) => STANDARD
                .decode(s.trim())
                .map(QueryParam::Bytes)
                .or_else(|_| fail("base64-encoded binary data")),
            _ => fail("base64-encoded binary data"),
        },
    }
}

/// Normalize a value read from the engine.
pub fn from_engine(abstract_type: AbstractType, value: JsonValue) -> JsonValue {
    match (abstract_type, value) {
        (AbstractType::Datetime, JsonValue::String(s)) => match parse_datetime(&s) {
            Some(t) => JsonValue::String(t.format()),
            None => JsonValue::String(s),
        },
        (AbstractType::Boolean, JsonValue::Number(n)) => match n.as_i64() {
            Some(0) => JsonValue::Bool(false),
            Some(1) => JsonValue::Bool(true),
            _ => JsonValue::Number(n),
        },
        (AbstractType::Integer, JsonValue::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => JsonValue::from(i),
            Err(_) => JsonValue::String(s),
        },
        (_, other) => other,
    }
}

fn is_decimal_literal(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next();
    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    match frac_part {
        None => !int_part.is_empty() && all_digits(int_part),
        Some(frac) => {
            (!int_part.is_empty() || !frac.is_empty()) && all_digits(int_part) && all_digits(frac)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_native_types() {
        assert_eq!(classify_native_type("varchar(255)"), AbstractType::Text);
        assert_eq!(classify_native_type("NVARCHAR(MAX)"), AbstractType::Text);
        assert_eq!(classify_native_type("int(11)"), AbstractType::Integer);
        assert_eq!(classify_native_type("bigint unsigned"), AbstractType::Integer);
        assert_eq!(classify_native_type("tinyint(1)"), AbstractType::Boolean);
        assert_eq!(classify_native_type("BIT"), AbstractType::Boolean);
        assert_eq!(classify_native_type("numeric(10,2)"), AbstractType::Decimal);
        assert_eq!(classify_native_type("NUMBER(19,0)"), AbstractType::Integer);
        assert_eq!(classify_native_type("NUMBER(10,2)"), AbstractType::Decimal);
        assert_eq!(classify_native_type("NUMBER"), AbstractType::Decimal);
        assert_eq!(classify_native_type("NUMBER(1)"), AbstractType::Boolean);
        assert_eq!(classify_native_type("timestamp without time zone"), AbstractType::Datetime);
        assert_eq!(classify_native_type("DATETIME2"), AbstractType::Datetime);
        assert_eq!(classify_native_type("bytea"), AbstractType::Binary);
        assert_eq!(classify_native_type("VARBINARY(MAX)"), AbstractType::Binary);
        assert_eq!(classify_native_type("double precision"), AbstractType::Decimal);
        assert_eq!(classify_native_type(""), AbstractType::Text);
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(
            parse_datetime("2024-01-15").map(|t| t.format()),
            Some("2024-01-15".to_string())
        );
        assert_eq!(
            parse_datetime("2024-01-15 10:30:00").map(|t| t.format()),
            Some("2024-01-15 10:30:00".to_string())
        );
        assert_eq!(
            parse_datetime("2024-01-15T10:30:00.123").map(|t| t.format()),
            Some("2024-01-15 10:30:00".to_string())
        );
        assert_eq!(
            parse_datetime("2024-01-15T10:30:00Z").map(|t| t.format()),
            Some("2024-01-15 10:30:00".to_string())
        );
        assert_eq!(
            parse_datetime("2024-01-15T10:30:00+02:00").map(|t| t.format()),
            Some("2024-01-15 08:30:00".to_string())
        );
        assert_eq!(
            parse_datetime("2024-01-15T23:30:00-05:00").map(|t| t.format()),
            Some("2024-01-16 04:30:00".to_string())
        );
        assert!(parse_datetime("15/01/2024").is_none());
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(to_param("n", AbstractType::Integer, &json!(5)).unwrap(), QueryParam::Int(5));
        assert_eq!(to_param("n", AbstractType::Integer, &json!(5.0)).unwrap(), QueryParam::Int(5));
        assert_eq!(to_param("n", AbstractType::Integer, &json!(" 42 ")).unwrap(), QueryParam::Int(42));
        let err = to_param("n", AbstractType::Integer, &json!("abc")).unwrap_err();
        assert!(err.to_string().contains("'n'"));
        assert!(to_param("n", AbstractType::Integer, &json!(1.5)).is_err());
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(to_param("b", AbstractType::Boolean, &json!("yes")).unwrap(), QueryParam::Bool(true));
        assert_eq!(to_param("b", AbstractType::Boolean, &json!(0)).unwrap(), QueryParam::Bool(false));
        assert!(to_param("b", AbstractType::Boolean, &json!(2)).is_err());
    }

    #[test]
    fn test_decimal_coercion_keeps_text() {
        assert_eq!(
            to_param("d", AbstractType::Decimal, &json!("12.50")).unwrap(),
            QueryParam::Decimal("12.50".into())
        );
        assert!(to_param("d", AbstractType::Decimal, &json!("1.2.3")).is_err());
        assert!(to_param("d", AbstractType::Decimal, &json!(".")).is_err());
    }

    #[test]
    fn test_datetime_and_binary_coercion() {
        let dt = to_param("c", AbstractType::Datetime, &json!("2024-01-15 10:30:00")).unwrap();
        assert!(matches!(dt, QueryParam::DateTime(_)));
        let d = to_param("c", AbstractType::Datetime, &json!("2024-01-15")).unwrap();
        assert!(matches!(d, QueryParam::Date(_)));
        assert!(to_param("c", AbstractType::Datetime, &json!(12)).is_err());

        assert_eq!(
            to_param("b", AbstractType::Binary, &json!("aGk=")).unwrap(),
            QueryParam::Bytes(b"hi".to_vec())
        );
        assert!(to_param("b", AbstractType::Binary, &json!("not base64!")).is_err());
    }

    #[test]
    fn test_null_passes_through() {
        for t in [AbstractType::Integer, AbstractType::Datetime, AbstractType::Binary] {
            assert!(to_param("x", t, &JsonValue::Null).unwrap().is_null());
        }
    }

    #[test]
    fn test_from_engine_normalization() {
        assert_eq!(
            from_engine(AbstractType::Datetime, json!("2024-01-15T10:30:00")),
            json!("2024-01-15 10:30:00")
        );
        assert_eq!(from_engine(AbstractType::Boolean, json!(1)), json!(true));
        assert_eq!(from_engine(AbstractType::Integer, json!("7")), json!(7));
        assert_eq!(from_engine(AbstractType::Text, json!("x")), json!("x"));
    }
}
