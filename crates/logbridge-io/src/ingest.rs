use std::sync::Arc;

use anyhow::Result;
use logbridge_core::{BridgeError, PayloadRx};
use logbridge_tx::Record;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::buffer::RowTx;
use crate::metrics::IngestMetrics;

/// What happened to one incoming payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Parsed into a row and handed to the batch buffer.
    Accepted,
    InvalidJson,
    /// Valid JSON, but not an object.
    NotAnObject,
}

impl IngestOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestOutcome::Accepted => "accepted",
            IngestOutcome::InvalidJson => "invalid_json",
            IngestOutcome::NotAnObject => "not_an_object",
        }
    }
}

/// Decodes payloads, parses them with a compiled [`Record`] and feeds the
/// resulting rows into a batch buffer.
pub struct Ingestor {
    record: Arc<Record>,
    rows: RowTx,
    metrics: IngestMetrics,
}

impl Ingestor {
    pub fn new(record: Arc<Record>, rows: RowTx, metrics: IngestMetrics) -> Self {
        Self {
            record,
            rows,
            metrics,
        }
    }

    /// Handle one payload. Undecodable payloads are counted and dropped;
    /// only a closed buffer is an error.
    pub async fn ingest(&self, payload: &[u8]) -> Result<IngestOutcome, BridgeError> {
        let outcome = match serde_json::from_slice::<serde_json::Value>(payload) {
            Err(e) => {
                warn!(error = %e, bytes = payload.len(), "dropping payload that is not JSON");
                IngestOutcome::InvalidJson
            }
            Ok(v) => match self.record.parse(&v) {
                Ok(row) => {
                    self.rows.add(row).await?;
                    IngestOutcome::Accepted
                }
                // Record::parse fails only on the top-level shape
                Err(e) => {
                    warn!(error = %e, category = e.category(), "dropping payload");
                    IngestOutcome::NotAnObject
                }
            },
        };
        self.metrics.observe(outcome.as_str());
        Ok(outcome)
    }

    /// Consume payloads until the source closes the channel or `cancel` fires.
    ///
    /// A buffer that went away after cancellation is a clean stop, not an
    /// error; payloads still queued at that point are dropped.
    pub async fn run(self, mut rx: PayloadRx, cancel: CancellationToken) -> Result<()> {
        loop {
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                p = rx.recv() => match p {
                    Some(p) => p,
                    None => break,
                },
            };
            match self.ingest(&payload).await {
                Ok(_) => {}
                Err(BridgeError::ChannelClosed(_)) if cancel.is_cancelled() => break,
                Err(e) => return Err(e.into()),
            }
        }
        info!(
            accepted = self.metrics.messages(IngestOutcome::Accepted.as_str()),
            "ingest stopped"
        );
        Ok(())
    }
}
