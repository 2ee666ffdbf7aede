use logbridge_core::ColumnKind;
use serde_json::Value as Json;

/// Why a single input value could not be converted.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("not an object: got {0}")]
    NotAnObject(&'static str),

    #[error("not an array: got {0}")]
    NotAnArray(&'static str),

    #[error("invalid type for {expected}: got {found}")]
    InvalidType {
        expected: ColumnKind,
        found: &'static str,
    },

    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid base64 for BYTES")]
    Decode(#[from] base64::DecodeError),
}

impl ParseError {
    pub(crate) fn invalid_type(expected: ColumnKind, found: &Json) -> Self {
        ParseError::InvalidType {
            expected,
            found: json_kind(found),
        }
    }

    /// Coarse category, logged with every dropped field.
    pub fn category(&self) -> &'static str {
        match self {
            ParseError::NotAnObject(_) | ParseError::NotAnArray(_) => "structural",
            ParseError::InvalidType { .. } => "type_mismatch",
            ParseError::InvalidTimestamp { .. } | ParseError::Decode(_) => "decode",
        }
    }
}

/// A schema the compiler cannot use.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema has no columns")]
    Empty,

    #[error("column {column}: unknown type {kind}")]
    UnknownKind { column: String, kind: String },

    #[error("column {column}: RECORD without nested fields")]
    EmptyRecord { column: String },
}

pub(crate) fn json_kind(v: &Json) -> &'static str {
    match v {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
