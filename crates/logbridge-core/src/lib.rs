//! # logbridge core
//!
//! Foundational types and traits shared by every logbridge crate: the typed
//! [`Value`]s a parsed row is made of, the column [`Schema`] that drives
//! parsing, the YAML pipeline configuration, and the operator seams
//! ([`Source`], [`RowSink`], [`Publisher`]) that connect the core to the
//! outside world.
//!
//! ## Key Components
//!
//! - **Values**: positional, typed rows produced by the record parser
//! - **Schema**: ordered column descriptors in BigQuery table-schema style
//! - **Operator Traits**: sources of raw payloads, batch sinks, publishers
//! - **Configuration**: YAML pipeline specification
//! - **Error Handling**: the [`BridgeError`] taxonomy for sink and transport failures
//!
//! ## Example Usage
//!
//! ```rust
//! use logbridge_core::{ColumnKind, ColumnSchema, Schema, Value};
//!
//! let schema = Schema::new(vec![
//!     ColumnSchema::new("client", ColumnKind::String),
//!     ColumnSchema::new("facility", ColumnKind::Integer),
//! ]);
//! let row = vec![Value::String("a".into()), Value::Integer(1)];
//! assert_eq!(schema.render_row(&row)["facility"], 1);
//! ```

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod schema;
pub mod spec;
pub mod value;

pub use schema::{ColumnKind, ColumnMode, ColumnSchema, Schema};
pub use spec::*;
pub use value::{Row, Value};

/// Raw, still-encoded message bytes as delivered by a source.
pub type Payload = Vec<u8>;

/// Sender side of the channel between a source and the first pipeline stage.
pub type PayloadTx = mpsc::Sender<Payload>;

/// Receiver side of the channel between a source and the first pipeline stage.
pub type PayloadRx = mpsc::Receiver<Payload>;

/// An untyped, decoded key/value message.
pub type Object = serde_json::Map<String, serde_json::Value>;

/// Errors raised by pipeline stages outside of row parsing.
///
/// Sink and transport failures are terminal for the batch or message they
/// concern and are logged by the stage that produced them; none of them is
/// meant to take the process down.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A channel between stages was closed by its other end.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A batch insert failed as a unit.
    #[error("sink {sink} rejected batch of {rows} rows")]
    Sink {
        sink: String,
        rows: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A single publish call failed.
    #[error("publish to topic {topic} failed")]
    Transport {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration rejected before the pipeline started.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Base trait for all pipeline operators.
pub trait Operator: Send + Sync {
    /// Identifier used in logs and metric labels.
    fn name(&self) -> &str;
}

/// Producer of raw payloads, e.g. a socket listener or a broker subscription.
///
/// Sources are the external collaborators of the core: whatever protocol they
/// speak, they surface as a channel of payload bytes.
#[async_trait]
pub trait Source: Operator {
    /// Run until the input is exhausted, the receiver goes away, or `cancel` fires.
    async fn run(&mut self, tx: PayloadTx, cancel: CancellationToken) -> Result<()>;
}

/// Bulk-insert destination consuming whole batches.
///
/// An insert either accepts every row or fails the batch as a unit.
#[async_trait]
pub trait RowSink: Operator {
    async fn insert(&mut self, rows: &[Row]) -> Result<()>;
}

/// Single-message publish call, awaited until the broker acknowledges it.
///
/// Implementations are shared between concurrently running publish tasks.
#[async_trait]
pub trait Publisher: Operator {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}
