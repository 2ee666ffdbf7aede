//! Relay of decoded messages onto a broker topic.
//!
//! Each message is optionally stamped with the time it was received, encoded
//! back to JSON and handed to the [`Dispatcher`] without waiting for the
//! broker.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use logbridge_core::{Object, PayloadRx};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::metrics::ForwardMetrics;

pub struct Forwarder {
    dispatcher: Dispatcher,
    topic: String,
    received_field: Option<String>,
    metrics: ForwardMetrics,
}

impl Forwarder {
    pub fn new(dispatcher: Dispatcher, topic: impl Into<String>, metrics: ForwardMetrics) -> Self {
        Self {
            dispatcher,
            topic: topic.into(),
            received_field: None,
            metrics,
        }
    }

    /// Stamp every message with its receive time under `field`, replacing
    /// any value already there.
    pub fn with_received_timestamp(mut self, field: impl Into<String>) -> Self {
        self.received_field = Some(field.into());
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Decode one payload and forward it. Anything but a JSON object is
    /// counted as a discard.
    pub fn forward_payload(&self, payload: &[u8]) -> Option<JoinHandle<()>> {
        self.metrics.inc_received();
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(serde_json::Value::Object(object)) => self.send(object),
            Ok(other) => {
                warn!(topic = %self.topic, "discarding non-object message: {}", other);
                self.metrics.inc_discard();
                None
            }
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "discarding undecodable message");
                self.metrics.inc_discard();
                None
            }
        }
    }

    /// Forward an already decoded message.
    pub fn forward(&self, object: Object) -> Option<JoinHandle<()>> {
        self.metrics.inc_received();
        self.send(object)
    }

    fn send(&self, mut object: Object) -> Option<JoinHandle<()>> {
        if let Some(field) = &self.received_field {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
            object.insert(field.clone(), now.into());
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut keys: Vec<&String> = object.keys().collect();
            keys.sort();
            for key in keys {
                debug!(topic = %self.topic, key = %key, value = %object[key.as_str()], "message field");
            }
        }
        match serde_json::to_vec(&object) {
            Ok(payload) => Some(self.dispatcher.dispatch(self.topic.clone(), payload)),
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "discarding unencodable message");
                self.metrics.inc_discard();
                None
            }
        }
    }

    /// Relay payloads until the source closes the channel or `cancel` fires.
    /// Once the input is exhausted, waits for publishes still in flight;
    /// after cancellation they are left to finish on their own.
    pub async fn run(self, mut rx: PayloadRx, cancel: CancellationToken) -> Result<()> {
        info!(topic = %self.topic, "forwarder started");
        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => break,
                p = rx.recv() => match p {
                    Some(p) => p,
                    None => break,
                },
            };
            self.forward_payload(&payload);
        }
        if !cancel.is_cancelled() {
            self.dispatcher.drain().await;
        }
        info!(
            topic = %self.topic,
            received = self.metrics.received(),
            discarded = self.metrics.discarded(),
            "forwarder stopped"
        );
        Ok(())
    }
}
