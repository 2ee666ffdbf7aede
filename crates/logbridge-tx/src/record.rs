use std::collections::HashMap;

use logbridge_core::{Row, Value};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::error::{ParseError, json_kind};
use crate::parser::Parser;

/// One column's output position and parser.
#[derive(Debug, Clone)]
pub struct Field {
    pub position: usize,
    pub parser: Parser,
}

/// Compiled parser for one level of a structured object.
///
/// Output rows always have exactly `count` slots. Input keys are resolved
/// through a lookup table built at compile time; several keys may point at
/// the same field.
#[derive(Debug, Clone)]
pub struct Record {
    count: usize,
    fields: Vec<Field>,
    keys: HashMap<String, usize>,
}

impl Record {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            count,
            fields: Vec::with_capacity(count),
            keys: HashMap::with_capacity(count * 2),
        }
    }

    /// Register `parser` at `position`, reachable under every name in `names`.
    /// A name that is already registered is re-pointed at the new field.
    pub(crate) fn add_field<I, S>(&mut self, parser: Parser, position: usize, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        debug_assert!(position < self.count, "field position out of range");
        let index = self.fields.len();
        self.fields.push(Field { position, parser });
        for name in names {
            self.keys.insert(name.into(), index);
        }
    }

    /// Width of the rows this record produces.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Output position that input key `key` is written to, if any.
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.field(key).map(|f| f.position)
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.keys.get(key).map(|&i| &self.fields[i])
    }

    /// Convert a JSON object into a row.
    ///
    /// Only a non-object input is an error. Keys without a column are
    /// ignored and values that fail to parse leave their slot `Null`; both
    /// are logged.
    pub fn parse(&self, v: &Json) -> Result<Row, ParseError> {
        let Json::Object(m) = v else {
            return Err(ParseError::NotAnObject(json_kind(v)));
        };
        let mut row = vec![Value::Null; self.count];
        for (key, value) in m {
            let Some(field) = self.field(key) else {
                debug!(key = %key, "no column for key");
                continue;
            };
            match field.parser.parse(value) {
                Ok(parsed) => row[field.position] = parsed,
                Err(e) => warn!(
                    key = %key,
                    category = e.category(),
                    error = %e,
                    "dropping unparsable field"
                ),
            }
        }
        Ok(row)
    }
}
