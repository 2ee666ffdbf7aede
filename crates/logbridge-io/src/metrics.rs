//! Prometheus collectors for the pipeline stages.
//!
//! Every stage takes its metric handles through its constructor. The handles
//! are registered into a caller-owned [`Registry`], so independent pipelines
//! (and tests) never share counters.

use prometheus::core::Collector;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry,
};

const NAMESPACE: &str = "logbridge";

/// Seconds.
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

fn register<C: Collector + Clone + 'static>(registry: &Registry, c: C) -> prometheus::Result<C> {
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn opts(subsystem: &str, name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem)
}

fn histogram_opts(subsystem: &str, name: &str, help: &str) -> HistogramOpts {
    HistogramOpts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(subsystem)
        .buckets(LATENCY_BUCKETS.to_vec())
}

/// Parse outcomes of the ingest stage.
#[derive(Clone)]
pub struct IngestMetrics {
    messages: IntCounterVec,
}

impl IngestMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let messages = register(
            registry,
            IntCounterVec::new(
                opts("ingest", "messages_total", "count of ingested messages by parse outcome"),
                &["result"],
            )?,
        )?;
        Ok(Self { messages })
    }

    pub(crate) fn observe(&self, result: &str) {
        self.messages.with_label_values(&[result]).inc();
    }

    pub fn messages(&self, result: &str) -> u64 {
        self.messages.with_label_values(&[result]).get()
    }
}

/// Flush outcomes of the batching buffer.
#[derive(Clone)]
pub struct BufferMetrics {
    batches: IntCounterVec,
    rows: IntCounter,
    insert_latency: Histogram,
}

impl BufferMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let batches = register(
            registry,
            IntCounterVec::new(
                opts("sink", "batches_total", "count of batch inserts by result and trigger"),
                &["result", "trigger"],
            )?,
        )?;
        let rows = register(
            registry,
            IntCounter::with_opts(opts("sink", "rows_total", "count of rows accepted by the sink"))?,
        )?;
        let insert_latency = register(
            registry,
            Histogram::with_opts(histogram_opts(
                "sink",
                "insert_latency_seconds",
                "latency of batch insert calls",
            ))?,
        )?;
        Ok(Self {
            batches,
            rows,
            insert_latency,
        })
    }

    pub(crate) fn observe_flush(&self, result: &str, trigger: &str, rows: usize, seconds: f64) {
        self.batches.with_label_values(&[result, trigger]).inc();
        self.insert_latency.observe(seconds);
        if result == "OK" {
            self.rows.inc_by(rows as u64);
        }
    }

    pub fn batches(&self, result: &str, trigger: &str) -> u64 {
        self.batches.with_label_values(&[result, trigger]).get()
    }

    pub fn rows(&self) -> u64 {
        self.rows.get()
    }
}

/// Outstanding publishes and publish latency, by topic.
#[derive(Clone)]
pub struct PublishMetrics {
    pub(crate) outstanding: IntGaugeVec,
    latency: HistogramVec,
}

impl PublishMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let outstanding = register(
            registry,
            IntGaugeVec::new(
                opts("publish", "outstanding", "count of outstanding publish calls"),
                &["topic"],
            )?,
        )?;
        let latency = register(
            registry,
            HistogramVec::new(
                histogram_opts("publish", "latency_seconds", "latency of publish calls"),
                &["topic", "result"],
            )?,
        )?;
        Ok(Self {
            outstanding,
            latency,
        })
    }

    pub(crate) fn observe_latency(&self, topic: &str, result: &str, seconds: f64) {
        self.latency.with_label_values(&[topic, result]).observe(seconds);
    }

    pub fn outstanding(&self, topic: &str) -> i64 {
        self.outstanding.with_label_values(&[topic]).get()
    }

    /// Number of completed publishes for `topic` with the given result.
    pub fn completed(&self, topic: &str, result: &str) -> u64 {
        self.latency
            .with_label_values(&[topic, result])
            .get_sample_count()
    }
}

/// Received and discarded messages of the forward stage.
#[derive(Clone)]
pub struct ForwardMetrics {
    received: IntCounter,
    discard: IntCounter,
}

impl ForwardMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let received = register(
            registry,
            IntCounter::with_opts(opts("forward", "received_total", "count of messages received"))?,
        )?;
        let discard = register(
            registry,
            IntCounter::with_opts(opts("forward", "discard_total", "count of messages discarded"))?,
        )?;
        Ok(Self { received, discard })
    }

    pub(crate) fn inc_received(&self) {
        self.received.inc();
    }

    pub(crate) fn inc_discard(&self) {
        self.discard.inc();
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    pub fn discarded(&self) -> u64 {
        self.discard.get()
    }
}

/// Encode everything registered in `registry` in the text exposition format.
pub fn encode_text(registry: &Registry) -> anyhow::Result<String> {
    use prometheus::Encoder;

    let mut buffer = Vec::new();
    prometheus::TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
