use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use logbridge_core::{ColumnKind, Value};
use serde_json::Value as Json;

use crate::error::{ParseError, json_kind};
use crate::record::Record;

/// Converts one untyped JSON value into one typed [`Value`].
///
/// The set of kinds is closed: one variant per primitive column type, plus
/// nested records and the repeated wrapper.
#[derive(Debug, Clone)]
pub enum Parser {
    /// RFC3339 string (fractional seconds allowed) or epoch seconds.
    Timestamp,
    /// Any value; non-strings are rendered as compact JSON.
    String,
    /// JSON numbers only. Fractions are truncated toward zero.
    Integer,
    Boolean,
    /// Standard-alphabet base64 string.
    Bytes,
    Record(Box<Record>),
    /// Applies the inner parser to every element of an array. The first
    /// failing element fails the whole value.
    Repeated(Box<Parser>),
}

impl Parser {
    pub fn parse(&self, v: &Json) -> Result<Value, ParseError> {
        match self {
            Parser::Timestamp => parse_timestamp(v),
            Parser::String => Ok(Value::String(match v {
                Json::String(s) => s.clone(),
                other => other.to_string(),
            })),
            Parser::Integer => parse_integer(v),
            Parser::Boolean => v
                .as_bool()
                .map(Value::Boolean)
                .ok_or_else(|| ParseError::invalid_type(ColumnKind::Boolean, v)),
            Parser::Bytes => match v {
                Json::String(s) => Ok(Value::Bytes(STANDARD.decode(s)?)),
                other => Err(ParseError::invalid_type(ColumnKind::Bytes, other)),
            },
            Parser::Record(record) => record.parse(v).map(Value::Record),
            Parser::Repeated(inner) => {
                let Json::Array(items) = v else {
                    return Err(ParseError::NotAnArray(json_kind(v)));
                };
                items
                    .iter()
                    .map(|item| inner.parse(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Repeated)
            }
        }
    }
}

fn parse_timestamp(v: &Json) -> Result<Value, ParseError> {
    match v {
        Json::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
            .map_err(|source| ParseError::InvalidTimestamp {
                value: s.clone(),
                source,
            }),
        Json::Number(n) => {
            let ts = match n.as_i64() {
                Some(secs) => DateTime::from_timestamp(secs, 0),
                None => n.as_f64().and_then(from_epoch_f64),
            };
            ts.map(Value::Timestamp)
                .ok_or_else(|| ParseError::invalid_type(ColumnKind::Timestamp, v))
        }
        other => Err(ParseError::invalid_type(ColumnKind::Timestamp, other)),
    }
}

fn from_epoch_f64(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(whole as i64, nanos)
}

fn parse_integer(v: &Json) -> Result<Value, ParseError> {
    let Json::Number(n) = v else {
        return Err(ParseError::invalid_type(ColumnKind::Integer, v));
    };
    if let Some(i) = n.as_i64() {
        return Ok(Value::Integer(i));
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(Value::Integer(f.trunc() as i64))
        }
        _ => Err(ParseError::invalid_type(ColumnKind::Integer, v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_timestamp_rfc3339_nanos() {
        let v = Parser::Timestamp
            .parse(&json!("2020-01-06T04:34:47.057492873Z"))
            .unwrap();
        assert_eq!(
            v,
            Value::Timestamp(Utc.timestamp_opt(1_578_285_287, 57_492_873).unwrap())
        );
    }

    #[test]
    fn test_timestamp_offset_is_normalised() {
        let v = Parser::Timestamp.parse(&json!("2020-01-05T20:34:47-08:00")).unwrap();
        assert_eq!(
            v,
            Value::Timestamp(Utc.with_ymd_and_hms(2020, 1, 6, 4, 34, 47).unwrap())
        );
    }

    #[test]
    fn test_timestamp_epoch_seconds() {
        assert_eq!(
            Parser::Timestamp.parse(&json!(1_578_285_287)).unwrap(),
            Value::Timestamp(Utc.timestamp_opt(1_578_285_287, 0).unwrap())
        );
        assert_eq!(
            Parser::Timestamp.parse(&json!(1.5)).unwrap(),
            Value::Timestamp(Utc.timestamp_opt(1, 500_000_000).unwrap())
        );
    }

    #[test]
    fn test_timestamp_rejects_other_types() {
        assert!(matches!(
            Parser::Timestamp.parse(&json!(true)),
            Err(ParseError::InvalidType { found: "boolean", .. })
        ));
        let err = Parser::Timestamp.parse(&json!("yesterday")).unwrap_err();
        assert!(matches!(err, ParseError::InvalidTimestamp { .. }));
        assert_eq!(err.category(), "decode");
    }

    #[test]
    fn test_string_never_fails() {
        assert_eq!(Parser::String.parse(&json!("a")).unwrap(), Value::from("a"));
        assert_eq!(Parser::String.parse(&json!(5)).unwrap(), Value::from("5"));
        assert_eq!(Parser::String.parse(&json!(true)).unwrap(), Value::from("true"));
        assert_eq!(Parser::String.parse(&json!(null)).unwrap(), Value::from("null"));
        assert_eq!(
            Parser::String.parse(&json!({"k": [1]})).unwrap(),
            Value::from(r#"{"k":[1]}"#)
        );
    }

    #[test]
    fn test_integer() {
        assert_eq!(Parser::Integer.parse(&json!(10809)).unwrap(), Value::Integer(10809));
        assert_eq!(Parser::Integer.parse(&json!(-3)).unwrap(), Value::Integer(-3));
        assert_eq!(Parser::Integer.parse(&json!(2.9)).unwrap(), Value::Integer(2));
        assert!(matches!(
            Parser::Integer.parse(&json!("1")),
            Err(ParseError::InvalidType { expected: ColumnKind::Integer, found: "string" })
        ));
        assert!(Parser::Integer.parse(&json!(u64::MAX)).is_err());
    }

    #[test]
    fn test_boolean() {
        assert_eq!(Parser::Boolean.parse(&json!(false)).unwrap(), Value::Boolean(false));
        assert!(Parser::Boolean.parse(&json!("true")).is_err());
        assert!(Parser::Boolean.parse(&json!(1)).is_err());
    }

    #[test]
    fn test_bytes() {
        assert_eq!(
            Parser::Bytes.parse(&json!("aGVsbG8=")).unwrap(),
            Value::Bytes(b"hello".to_vec())
        );
        let err = Parser::Bytes.parse(&json!("not base64!")).unwrap_err();
        assert!(matches!(err, ParseError::Decode(_)));
        assert!(matches!(
            Parser::Bytes.parse(&json!([1, 2])),
            Err(ParseError::InvalidType { found: "array", .. })
        ));
    }

    #[test]
    fn test_repeated_keeps_order_and_length() {
        let p = Parser::Repeated(Box::new(Parser::String));
        assert_eq!(
            p.parse(&json!(["a", "b"])).unwrap(),
            Value::Repeated(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            p.parse(&json!(["a", 5])).unwrap(),
            Value::Repeated(vec![Value::from("a"), Value::from("5")])
        );
        assert_eq!(p.parse(&json!([])).unwrap(), Value::Repeated(vec![]));
    }

    #[test]
    fn test_repeated_bad_element_fails_whole_field() {
        let p = Parser::Repeated(Box::new(Parser::Integer));
        assert!(matches!(
            p.parse(&json!([1, "two", 3])),
            Err(ParseError::InvalidType { expected: ColumnKind::Integer, .. })
        ));
    }

    #[test]
    fn test_repeated_requires_array() {
        let p = Parser::Repeated(Box::new(Parser::String));
        let err = p.parse(&json!("a")).unwrap_err();
        assert!(matches!(err, ParseError::NotAnArray("string")));
        assert_eq!(err.category(), "structural");
    }
}
