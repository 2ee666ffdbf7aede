//! Column schemas in BigQuery table-schema style.
//!
//! A schema document is either a bare array of columns or an object with a
//! `fields` array:
//!
//! ```json
//! [
//!   {"name": "ts", "type": "TIMESTAMP"},
//!   {"name": "message", "type": "RECORD", "fields": [{"name": "id", "type": "INTEGER"}]},
//!   {"name": "question", "type": "STRING", "mode": "REPEATED",
//!    "description": "dns question names json:\"Question\""}
//! ]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::value::Value;

/// Primitive type of a column.
///
/// Unrecognised type names are kept verbatim in [`ColumnKind::Other`] so the
/// compiler can decide what to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ColumnKind {
    String,
    Integer,
    Timestamp,
    Boolean,
    Bytes,
    Record,
    Other(String),
}

impl From<String> for ColumnKind {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => ColumnKind::String,
            "INTEGER" | "INT64" => ColumnKind::Integer,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "BOOLEAN" | "BOOL" => ColumnKind::Boolean,
            "BYTES" => ColumnKind::Bytes,
            "RECORD" | "STRUCT" => ColumnKind::Record,
            _ => ColumnKind::Other(name),
        }
    }
}

impl From<ColumnKind> for String {
    fn from(kind: ColumnKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::String => write!(f, "STRING"),
            ColumnKind::Integer => write!(f, "INTEGER"),
            ColumnKind::Timestamp => write!(f, "TIMESTAMP"),
            ColumnKind::Boolean => write!(f, "BOOLEAN"),
            ColumnKind::Bytes => write!(f, "BYTES"),
            ColumnKind::Record => write!(f, "RECORD"),
            ColumnKind::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

/// One column descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: ColumnKind,

    #[serde(default)]
    pub mode: ColumnMode,

    /// Free text; may embed a `json:"<key>"` annotation naming the input key
    /// this column is read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nested columns of a RECORD column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ColumnSchema>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            mode: ColumnMode::Nullable,
            description: None,
            fields: Vec::new(),
        }
    }

    /// A RECORD column with the given nested columns.
    pub fn record(name: impl Into<String>, fields: Vec<ColumnSchema>) -> Self {
        Self {
            fields,
            ..Self::new(name, ColumnKind::Record)
        }
    }

    pub fn repeated(mut self) -> Self {
        self.mode = ColumnMode::Repeated;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == ColumnMode::Repeated
    }
}

/// Ordered list of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    Columns(Vec<ColumnSchema>),
    Table { fields: Vec<ColumnSchema> },
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    /// Parse a schema document, accepting either a bare column array or a
    /// `{"fields": [...]}` object.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        let columns = match serde_json::from_str(s)? {
            SchemaDocument::Columns(columns) => columns,
            SchemaDocument::Table { fields } => fields,
        };
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render a row as a JSON object keyed by column name. Unset slots are
    /// omitted; nested records become objects.
    pub fn render_row(&self, row: &[Value]) -> Json {
        render_fields(&self.columns, row)
    }
}

fn render_fields(columns: &[ColumnSchema], row: &[Value]) -> Json {
    let mut out = serde_json::Map::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(row) {
        if !value.is_null() {
            out.insert(column.name.clone(), render_column(column, value));
        }
    }
    Json::Object(out)
}

fn render_column(column: &ColumnSchema, value: &Value) -> Json {
    match value {
        Value::Record(fields) => render_fields(&column.fields, fields),
        Value::Repeated(items) => {
            Json::Array(items.iter().map(|item| render_column(column, item)).collect())
        }
        other => other.to_json(),
    }
}
