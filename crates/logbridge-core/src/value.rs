use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as Json;

/// One parsed record: a slot per declared column, in declaration order.
pub type Row = Vec<Value>;

/// A typed column value.
///
/// `Null` marks a slot that was missing from the input or failed to parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Timestamp(DateTime<Utc>),
    String(String),
    Integer(i64),
    Boolean(bool),
    Bytes(Vec<u8>),
    /// A nested record, positionally aligned to the nested schema.
    Record(Row),
    /// The elements of a repeated column.
    Repeated(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Positional JSON rendering. Nested records become arrays; use
    /// [`Schema::render_row`](crate::Schema::render_row) for named output.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::String(s) => Json::String(s.clone()),
            Value::Integer(n) => Json::from(*n),
            Value::Boolean(b) => Json::Bool(*b),
            Value::Bytes(b) => Json::String(STANDARD.encode(b)),
            Value::Record(fields) => Json::Array(fields.iter().map(Value::to_json).collect()),
            Value::Repeated(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}
