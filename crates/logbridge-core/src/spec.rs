//! YAML pipeline configuration.
//!
//! # Example YAML Configuration
//!
//! ```yaml
//! name: "syslog-to-warehouse"
//! source:
//!   type: kafka
//!   id: "syslog-in"
//!   brokers: "localhost:9092"
//!   group_id: "logbridge"
//!   topic: "syslog/raw/json"
//! stage:
//!   type: load
//!   schema_path: "schemas/syslog.json"
//!   batch:
//!     max_size: 5000
//!     max_delay_ms: 300000
//!   sink:
//!     type: jsonl_file
//!     id: "warehouse"
//!     path: "out/syslog.jsonl"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete pipeline specification: one source feeding one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Human-readable name of the pipeline
    pub name: String,

    pub source: SourceSpec,

    pub stage: StageSpec,
}

impl PipelineSpec {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let y = std::fs::read_to_string(path)
            .with_context(|| format!("read pipeline {}", path.display()))?;
        Self::from_yaml_str(&y).with_context(|| format!("parse pipeline {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceSpec {
    /// Newline-delimited JSON on standard input.
    #[serde(rename = "stdin")]
    Stdin { id: String },
    #[serde(rename = "kafka")]
    Kafka(KafkaSourceSpec),
}

/// Configuration for Kafka payload sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaSourceSpec {
    /// Unique identifier for this source operator
    pub id: String,

    /// Comma-separated list of Kafka broker addresses
    ///
    /// Example: "localhost:9092" or "broker1:9092,broker2:9092,broker3:9092"
    pub brokers: String,

    /// Kafka consumer group ID
    pub group_id: String,

    /// Name of the Kafka topic to consume from
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageSpec {
    /// Parse payloads against a column schema and batch-insert the rows.
    #[serde(rename = "load")]
    Load(LoadSpec),
    /// Re-publish decoded messages on a broker topic.
    #[serde(rename = "forward")]
    Forward(ForwardSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSpec {
    /// Path of the JSON column schema document
    pub schema_path: String,

    #[serde(default)]
    pub batch: BatchSpec,

    pub sink: SinkSpec,
}

/// Dual size/time flush thresholds for the batching buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Maximum number of rows in one insert call
    #[serde(default = "default_batch_max_size")]
    pub max_size: usize,

    /// Maximum time a row may wait for its batch, measured from the first row
    /// of the batch
    #[serde(default = "default_batch_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self {
            max_size: default_batch_max_size(),
            max_delay_ms: default_batch_max_delay_ms(),
        }
    }
}

fn default_batch_max_size() -> usize {
    5000
}

fn default_batch_max_delay_ms() -> u64 {
    5 * 60 * 1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SinkSpec {
    #[serde(rename = "stdout_jsonl")]
    Stdout { id: String },
    #[serde(rename = "jsonl_file")]
    JsonlFile { id: String, path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardSpec {
    /// Topic every forwarded message is published on
    pub topic: String,

    /// If set, each message gets this key stamped with its receive time
    #[serde(default)]
    pub received_timestamp_field: Option<String>,

    pub publisher: PublisherSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PublisherSpec {
    #[serde(rename = "stdout")]
    Stdout { id: String },
    #[serde(rename = "kafka")]
    Kafka(KafkaPublisherSpec),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaPublisherSpec {
    pub id: String,
    pub brokers: String,
}
