//! Size/time-triggered batching in front of a [`RowSink`].
//!
//! One consuming task owns the batch. It waits for the first row of a cycle,
//! arms a deadline of `max_delay`, and then collects rows until either the
//! batch holds `max_size` rows or the deadline passes, whichever comes first.
//! The batch is then handed to the sink in a single insert call and cleared,
//! whatever the outcome, and the next row starts a new cycle.
//!
//! Producers hand rows over through [`RowTx`]. The hand-over channel holds a
//! single row, so while an insert is in flight one more row can be queued
//! and every further producer stalls until the insert returns.

use std::time::Duration;

use anyhow::Result;
use logbridge_core::{BatchSpec, BridgeError, Row, RowSink};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::BufferMetrics;

/// Flush thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_size: usize,
    pub max_delay: Duration,
}

impl BatchConfig {
    pub fn new(max_size: usize, max_delay: Duration) -> Self {
        Self {
            max_size,
            max_delay,
        }
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.max_size == 0 {
            return Err(BridgeError::Config("batch max_size must be at least 1".into()));
        }
        if self.max_delay.is_zero() {
            return Err(BridgeError::Config("batch max_delay must be positive".into()));
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig::from(&BatchSpec::default())
    }
}

impl From<&BatchSpec> for BatchConfig {
    fn from(spec: &BatchSpec) -> Self {
        Self::new(spec.max_size, Duration::from_millis(spec.max_delay_ms))
    }
}

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Size,
    Deadline,
    /// Every producer went away; the partial batch is flushed once.
    Closed,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Size => "size",
            Trigger::Deadline => "deadline",
            Trigger::Closed => "closed",
        }
    }
}

/// Producer handle of a [`BatchBuffer`].
#[derive(Debug, Clone)]
pub struct RowTx {
    tx: mpsc::Sender<Row>,
}

impl RowTx {
    /// Hand a row to the buffer. Returns once the row is queued; with a row
    /// already queued behind an in-flight insert, waits for that insert.
    pub async fn add(&self, row: Row) -> Result<(), BridgeError> {
        self.tx
            .send(row)
            .await
            .map_err(|_| BridgeError::ChannelClosed("batch buffer"))
    }
}

/// Consuming side: owns the batch storage and the sink.
pub struct BatchBuffer {
    config: BatchConfig,
    sink: Box<dyn RowSink>,
    metrics: BufferMetrics,
    rx: mpsc::Receiver<Row>,
    batch: Vec<Row>,
}

/// Create a buffer and its producer handle.
pub fn channel(
    config: BatchConfig,
    sink: Box<dyn RowSink>,
    metrics: BufferMetrics,
) -> Result<(RowTx, BatchBuffer), BridgeError> {
    config.validate()?;
    let (tx, rx) = mpsc::channel(1);
    let buffer = BatchBuffer {
        batch: Vec::with_capacity(config.max_size),
        config,
        sink,
        metrics,
        rx,
    };
    Ok((RowTx { tx }, buffer))
}

impl BatchBuffer {
    /// Consume rows until every [`RowTx`] is dropped or `cancel` fires.
    ///
    /// Cancellation drops the rows of the current cycle without flushing.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            sink = self.sink.name(),
            max_size = self.config.max_size,
            max_delay_ms = self.config.max_delay.as_millis() as u64,
            "batch buffer started"
        );
        loop {
            let first = tokio::select! {
                _ = cancel.cancelled() => break,
                row = self.rx.recv() => match row {
                    Some(row) => row,
                    None => break,
                },
            };
            self.batch.push(first);
            debug!(sink = self.sink.name(), "batch opened");

            let deadline = sleep(self.config.max_delay);
            tokio::pin!(deadline);
            let trigger = loop {
                if self.batch.len() >= self.config.max_size {
                    break Trigger::Size;
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        warn!(
                            sink = self.sink.name(),
                            rows = self.batch.len(),
                            "cancelled with unflushed rows"
                        );
                        return Ok(());
                    }
                    _ = &mut deadline => break Trigger::Deadline,
                    row = self.rx.recv() => match row {
                        Some(row) => self.batch.push(row),
                        None => break Trigger::Closed,
                    },
                }
            };

            self.flush(trigger).await;
            if trigger == Trigger::Closed {
                break;
            }
        }
        info!(sink = self.sink.name(), "batch buffer stopped");
        Ok(())
    }

    async fn flush(&mut self, trigger: Trigger) {
        let rows = self.batch.len();
        info!(
            sink = self.sink.name(),
            rows,
            max_size = self.config.max_size,
            trigger = trigger.as_str(),
            "sending batch"
        );
        let start = Instant::now();
        let result = self.sink.insert(&self.batch).await;
        let elapsed = start.elapsed().as_secs_f64();
        let outcome = match result {
            Ok(()) => "OK",
            Err(source) => {
                let err = BridgeError::Sink {
                    sink: self.sink.name().to_string(),
                    rows,
                    source,
                };
                warn!(error = ?err, "dropping batch");
                "error"
            }
        };
        self.metrics
            .observe_flush(outcome, trigger.as_str(), rows, elapsed);
        self.batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use logbridge_core::{Operator, Value};
    use prometheus::Registry;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct Flushed {
        at: Duration,
        rows: Vec<Row>,
    }

    /// Records every insert with the (paused) time it happened at.
    #[derive(Clone)]
    struct RecordingSink {
        start: Instant,
        flushed: Arc<Mutex<Vec<Flushed>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new(fail: bool) -> Self {
            Self {
                start: Instant::now(),
                flushed: Arc::new(Mutex::new(Vec::new())),
                fail,
            }
        }

        fn flushed(&self) -> Vec<Flushed> {
            self.flushed.lock().unwrap().clone()
        }
    }

    impl Operator for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }
    }

    #[async_trait]
    impl RowSink for RecordingSink {
        async fn insert(&mut self, rows: &[Row]) -> Result<()> {
            self.flushed.lock().unwrap().push(Flushed {
                at: self.start.elapsed(),
                rows: rows.to_vec(),
            });
            if self.fail {
                anyhow::bail!("warehouse unavailable");
            }
            Ok(())
        }
    }

    fn row(n: i64) -> Row {
        vec![Value::Integer(n)]
    }

    fn start(
        max_size: usize,
        max_delay: Duration,
        fail: bool,
    ) -> (RowTx, RecordingSink, BufferMetrics, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let sink = RecordingSink::new(fail);
        let metrics = BufferMetrics::register(&Registry::new()).unwrap();
        let (tx, buffer) = channel(
            BatchConfig::new(max_size, max_delay),
            Box::new(sink.clone()),
            metrics.clone(),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(buffer.run(cancel.clone()));
        (tx, sink, metrics, cancel, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_flushes_partial_batch() {
        let (tx, sink, metrics, _cancel, _handle) = start(3, Duration::from_secs(5), false);

        tx.add(row(1)).await.unwrap();
        tx.add(row(2)).await.unwrap();
        sleep(Duration::from_millis(4900)).await;
        assert!(sink.flushed().is_empty());

        sleep(Duration::from_millis(200)).await;
        let flushed = sink.flushed();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].rows, vec![row(1), row(2)]);
        assert_eq!(flushed[0].at, Duration::from_secs(5));
        assert_eq!(metrics.batches("OK", "deadline"), 1);
        assert_eq!(metrics.rows(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_immediately() {
        let (tx, sink, metrics, _cancel, _handle) = start(3, Duration::from_secs(5), false);

        for n in 1..=3 {
            tx.add(row(n)).await.unwrap();
        }
        sleep(Duration::from_millis(1)).await;
        let flushed = sink.flushed();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].rows, vec![row(1), row(2), row(3)]);
        assert_eq!(flushed[0].at, Duration::ZERO);

        // the deadline of the flushed cycle must not fire an empty flush
        sleep(Duration::from_secs(10)).await;
        assert_eq!(sink.flushed().len(), 1);
        assert_eq!(metrics.batches("OK", "size"), 1);
        assert_eq!(metrics.batches("OK", "deadline"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_never_exceed_max_size() {
        let (tx, sink, _metrics, _cancel, _handle) = start(4, Duration::from_secs(60), false);

        for n in 0..10 {
            tx.add(row(n)).await.unwrap();
        }
        sleep(Duration::from_secs(61)).await;

        let sizes: Vec<usize> = sink.flushed().iter().map(|f| f.rows.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        let all: Vec<Row> = sink.flushed().into_iter().flat_map(|f| f.rows).collect();
        assert_eq!(all, (0..10).map(row).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_row_after_flush_starts_fresh_deadline() {
        let (tx, sink, _metrics, _cancel, _handle) = start(10, Duration::from_secs(5), false);

        tx.add(row(1)).await.unwrap();
        sleep(Duration::from_secs(7)).await;
        tx.add(row(2)).await.unwrap();
        sleep(Duration::from_secs(4)).await;
        assert_eq!(sink.flushed().len(), 1);

        sleep(Duration::from_secs(2)).await;
        let flushed = sink.flushed();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].at, Duration::from_secs(5));
        assert_eq!(flushed[1].at, Duration::from_secs(12));
        assert_eq!(flushed[1].rows, vec![row(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_insert_still_resets_cycle() {
        let (tx, sink, metrics, _cancel, _handle) = start(2, Duration::from_secs(5), true);

        for n in 0..3 {
            tx.add(row(n)).await.unwrap();
        }
        sleep(Duration::from_secs(6)).await;

        let flushed = sink.flushed();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].rows, vec![row(0), row(1)]);
        assert_eq!(flushed[1].rows, vec![row(2)]);
        assert_eq!(metrics.batches("error", "size"), 1);
        assert_eq!(metrics.batches("error", "deadline"), 1);
        assert_eq!(metrics.rows(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_flushes_remaining_rows() {
        let (tx, sink, metrics, _cancel, handle) = start(10, Duration::from_secs(300), false);

        tx.add(row(1)).await.unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        let flushed = sink.flushed();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].rows, vec![row(1)]);
        assert_eq!(flushed[0].at, Duration::ZERO);
        assert_eq!(metrics.batches("OK", "closed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_rows() {
        let (tx, sink, _metrics, cancel, handle) = start(10, Duration::from_secs(5), false);

        tx.add(row(1)).await.unwrap();
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(sink.flushed().is_empty());
        assert!(tx.add(row(2)).await.is_err());
    }

    struct SlowSink(Duration);

    impl Operator for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }
    }

    #[async_trait]
    impl RowSink for SlowSink {
        async fn insert(&mut self, _rows: &[Row]) -> Result<()> {
            sleep(self.0).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_row_queues_behind_inflight_insert() {
        let metrics = BufferMetrics::register(&Registry::new()).unwrap();
        let (tx, buffer) = channel(
            BatchConfig::new(1, Duration::from_secs(60)),
            Box::new(SlowSink(Duration::from_secs(10))),
            metrics,
        )
        .unwrap();
        tokio::spawn(buffer.run(CancellationToken::new()));
        let start = Instant::now();

        tx.add(row(0)).await.unwrap();
        tx.add(row(1)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        tx.add(row(2)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_validation() {
        assert!(BatchConfig::new(0, Duration::from_secs(1)).validate().is_err());
        assert!(BatchConfig::new(1, Duration::ZERO).validate().is_err());
        assert!(BatchConfig::new(1, Duration::from_millis(1)).validate().is_ok());
        assert_eq!(
            BatchConfig::default(),
            BatchConfig::new(5000, Duration::from_secs(300))
        );
    }
}
