//! # logbridge I/O - pipeline stages, sources, sinks and publishers
//!
//! This crate wires the record parser from `logbridge-tx` into running
//! pipelines and provides the concrete connectors at both ends.
//!
//! ## Features
//!
//! ### Stages
//! - **Ingest**: JSON payload → typed row → batch buffer
//! - **Batch buffer**: size/time triggered bulk inserts into a [`RowSink`](logbridge_core::RowSink)
//! - **Forward**: JSON payload → received-time stamp → fire-and-forget publish
//! - **Dispatch**: per-topic outstanding and latency accounting for publishes
//!
//! ### Sources
//! - **Stdin**: newline-delimited payloads
//! - **Kafka** (feature `kafka`): topic subscription
//!
//! ### Sinks and publishers
//! - **JSON lines**: one object per row on stdout or an appended file
//! - **Stdout publisher**: `topic<TAB>payload` lines
//! - **Kafka publisher** (feature `kafka`)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use logbridge_core::{ColumnKind, ColumnSchema, Schema};
//! use logbridge_io::buffer::{self, BatchConfig};
//! use logbridge_io::metrics::BufferMetrics;
//! use logbridge_io::sink_jsonl::JsonLinesSink;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let schema = Schema::new(vec![ColumnSchema::new("client", ColumnKind::String)]);
//! let registry = prometheus::Registry::new();
//! let (rows, buffer) = buffer::channel(
//!     BatchConfig::new(500, Duration::from_secs(10)),
//!     Box::new(JsonLinesSink::stdout("out", schema)),
//!     BufferMetrics::register(&registry)?,
//! )?;
//! tokio::spawn(buffer.run(Default::default()));
//! rows.add(vec!["192.168.8.68".into()]).await?;
//! # Ok(())
//! # }
//! ```

/// Size/time triggered batching in front of a row sink
pub mod buffer;

/// Fire-and-forget publishing with per-topic metrics
pub mod dispatch;

/// Relay of decoded messages to a broker topic
pub mod forward;

/// Payload decoding and row parsing
pub mod ingest;

/// Per-instance prometheus collectors
pub mod metrics;

/// Standard output publisher for dry runs
pub mod publish_stdout;

/// JSON lines sink
pub mod sink_jsonl;

/// Newline-delimited stdin source
pub mod source_stdin;

/// Apache Kafka publisher
#[cfg(feature = "kafka")]
pub mod publish_kafka;

/// Apache Kafka source
#[cfg(feature = "kafka")]
pub mod source_kafka;
