use std::sync::OnceLock;

use logbridge_core::{ColumnKind, ColumnSchema, Schema};
use regex::Regex;
use tracing::warn;

use crate::error::SchemaError;
use crate::parser::Parser;
use crate::record::Record;

/// Build a [`Record`] parser from a column schema.
///
/// Input keys match a column by its declared name or the lowercase form of
/// it, unless the column description carries a `json:"<key>"` tag, in which
/// case only `<key>` matches. Columns whose type cannot be parsed are skipped
/// with a warning at any depth; their slot is always `Null`.
pub fn compile(schema: &Schema) -> Result<Record, SchemaError> {
    if schema.is_empty() {
        return Err(SchemaError::Empty);
    }
    Ok(compile_columns(&schema.columns))
}

fn compile_columns(columns: &[ColumnSchema]) -> Record {
    let mut record = Record::new(columns.len());
    for (position, column) in columns.iter().enumerate() {
        let parser = match column_parser(column) {
            Ok(p) => p,
            Err(e) => {
                warn!(column = %column.name, error = %e, "skipping column");
                continue;
            }
        };
        let parser = if column.is_repeated() {
            Parser::Repeated(Box::new(parser))
        } else {
            parser
        };
        record.add_field(parser, position, match_keys(column));
    }
    record
}

fn column_parser(column: &ColumnSchema) -> Result<Parser, SchemaError> {
    Ok(match &column.kind {
        ColumnKind::String => Parser::String,
        ColumnKind::Integer => Parser::Integer,
        ColumnKind::Timestamp => Parser::Timestamp,
        ColumnKind::Boolean => Parser::Boolean,
        ColumnKind::Bytes => Parser::Bytes,
        ColumnKind::Record if column.fields.is_empty() => {
            return Err(SchemaError::EmptyRecord {
                column: column.name.clone(),
            });
        }
        ColumnKind::Record => Parser::Record(Box::new(compile_columns(&column.fields))),
        ColumnKind::Other(kind) => {
            return Err(SchemaError::UnknownKind {
                column: column.name.clone(),
                kind: kind.clone(),
            });
        }
    })
}

fn match_keys(column: &ColumnSchema) -> Vec<String> {
    match column.description.as_deref().and_then(json_alias) {
        Some(alias) => vec![alias.to_string()],
        None => vec![column.name.clone(), column.name.to_lowercase()],
    }
}

/// Extract the key name from a `json:"name,opts"` tag embedded in free text.
/// Empty names and `-` are ignored.
pub fn json_alias(description: &str) -> Option<&str> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r#"(?:^|\s)json:"([^"]*)""#).expect("valid tag pattern"));
    let value = tag.captures(description)?.get(1)?.as_str();
    let name = value.split(',').next().unwrap_or_default();
    (!name.is_empty() && name != "-").then_some(name)
}
