//! # logbridge tx - schema-driven record parsing
//!
//! Turns untyped JSON messages into fixed-width typed rows. A column
//! [`Schema`](logbridge_core::Schema) is compiled once into a [`Record`]
//! tree; the record is then immutable and can be shared between tasks.
//!
//! ```rust
//! use logbridge_core::{ColumnKind, ColumnSchema, Schema, Value};
//! use serde_json::json;
//!
//! let schema = Schema::new(vec![
//!     ColumnSchema::new("client", ColumnKind::String),
//!     ColumnSchema::new("facility", ColumnKind::Integer),
//! ]);
//! let record = logbridge_tx::compile(&schema)?;
//! let row = record.parse(&json!({"client": "a", "facility": 1, "bogus": 5}))?;
//! assert_eq!(row, vec![Value::from("a"), Value::Integer(1)]);
//! # Ok::<(), anyhow::Error>(())
//! ```

mod compile;
mod error;
mod parser;
mod record;

pub use compile::{compile, json_alias};
pub use error::{ParseError, SchemaError};
pub use parser::Parser;
pub use record::{Field, Record};
