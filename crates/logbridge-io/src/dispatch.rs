//! Fire-and-forget publishing with per-topic accounting.
//!
//! [`Dispatcher::dispatch`] returns as soon as the publish task is spawned.
//! The task keeps the topic's outstanding gauge raised for as long as the
//! publish call is in flight and records its latency under the topic and
//! result once it completes. Failures are logged, never returned.

use std::sync::Arc;

use logbridge_core::{BridgeError, Publisher};
use prometheus::IntGauge;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::metrics::PublishMetrics;

#[derive(Clone)]
pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
    metrics: PublishMetrics,
    tracker: TaskTracker,
}

/// Raised while a publish is in flight; lowered on drop, so an aborted or
/// panicking task still releases the gauge.
struct Outstanding(IntGauge);

impl Outstanding {
    fn raise(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.dec();
    }
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, metrics: PublishMetrics) -> Self {
        Self {
            publisher,
            metrics,
            tracker: TaskTracker::new(),
        }
    }

    pub fn metrics(&self) -> &PublishMetrics {
        &self.metrics
    }

    /// Publish `payload` on a new task and return immediately.
    ///
    /// The handle is only useful to callers that want to wait for
    /// completion; dropping it leaves the task running.
    pub fn dispatch(&self, topic: impl Into<String>, payload: Vec<u8>) -> JoinHandle<()> {
        let this = self.clone();
        let topic = topic.into();
        self.tracker
            .spawn(async move { this.publish(&topic, &payload).await })
    }

    /// Wait until every publish dispatched so far has completed.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Publish inline, with the same accounting as [`dispatch`](Self::dispatch).
    pub async fn publish(&self, topic: &str, payload: &[u8]) {
        let _outstanding =
            Outstanding::raise(self.metrics.outstanding.with_label_values(&[topic]));
        let start = Instant::now();
        let result = self.publisher.publish(topic, payload).await;
        let elapsed = start.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(()) => {
                debug!(publisher = self.publisher.name(), topic, bytes = payload.len(), "published");
                "OK"
            }
            Err(source) => {
                let err = BridgeError::Transport {
                    topic: topic.to_string(),
                    source,
                };
                warn!(publisher = self.publisher.name(), error = ?err, "publish failed");
                "error"
            }
        };
        self.metrics.observe_latency(topic, outcome, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use logbridge_core::Operator;
    use prometheus::Registry;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Blocks every publish until a permit is released; payloads equal to
    /// `fail` are rejected.
    struct GatedPublisher {
        gate: Semaphore,
        fail: &'static [u8],
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl GatedPublisher {
        fn new(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(permits),
                fail: b"bad",
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Operator for GatedPublisher {
        fn name(&self) -> &str {
            "gated"
        }
    }

    #[async_trait]
    impl Publisher for GatedPublisher {
        async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
            self.gate.acquire().await?.forget();
            self.seen
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_vec()));
            if payload == self.fail {
                anyhow::bail!("broker refused message");
            }
            Ok(())
        }
    }

    fn dispatcher(publisher: Arc<GatedPublisher>) -> Dispatcher {
        let metrics = PublishMetrics::register(&Registry::new()).unwrap();
        Dispatcher::new(publisher, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_outstanding_tracks_in_flight_publishes() {
        let publisher = GatedPublisher::new(0);
        let d = dispatcher(publisher.clone());

        let h1 = d.dispatch("syslog/json", b"one".to_vec());
        let h2 = d.dispatch("syslog/json", b"two".to_vec());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(d.metrics().outstanding("syslog/json"), 2);

        publisher.gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(d.metrics().outstanding("syslog/json"), 1);

        publisher.gate.add_permits(1);
        h1.await.unwrap();
        h2.await.unwrap();
        assert_eq!(d.metrics().outstanding("syslog/json"), 0);
        assert_eq!(d.metrics().completed("syslog/json", "OK"), 2);
        assert_eq!(d.metrics().completed("syslog/json", "error"), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_is_recorded_not_raised() {
        let publisher = GatedPublisher::new(10);
        let d = dispatcher(publisher.clone());

        d.dispatch("dnstap/json", b"bad".to_vec()).await.unwrap();
        d.dispatch("dnstap/json", b"good".to_vec()).await.unwrap();

        assert_eq!(d.metrics().outstanding("dnstap/json"), 0);
        assert_eq!(d.metrics().completed("dnstap/json", "error"), 1);
        assert_eq!(d.metrics().completed("dnstap/json", "OK"), 1);
    }

    #[tokio::test]
    async fn test_topics_are_accounted_separately() {
        let publisher = GatedPublisher::new(0);
        let d = dispatcher(publisher.clone());

        let a = d.dispatch("a", b"1".to_vec());
        let b = d.dispatch("b", b"2".to_vec());
        tokio::task::yield_now().await;
        while d.metrics().outstanding("a") + d.metrics().outstanding("b") < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(d.metrics().outstanding("a"), 1);
        assert_eq!(d.metrics().outstanding("b"), 1);

        publisher.gate.add_permits(2);
        a.await.unwrap();
        b.await.unwrap();
        assert_eq!(d.metrics().completed("a", "OK"), 1);
        assert_eq!(d.metrics().completed("b", "OK"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatches_settle_to_zero() {
        let publisher = GatedPublisher::new(1000);
        let d = dispatcher(publisher.clone());

        let handles: Vec<_> = (0..50)
            .map(|i| d.dispatch("syslog/json", format!("msg-{i}").into_bytes()))
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(d.metrics().outstanding("syslog/json"), 0);
        assert_eq!(d.metrics().completed("syslog/json", "OK"), 50);
        assert_eq!(publisher.seen.lock().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_publishes() {
        let publisher = GatedPublisher::new(0);
        let d = dispatcher(publisher.clone());

        for i in 0..3 {
            d.dispatch("t", vec![i]);
        }
        let waiter = tokio::spawn({
            let d = d.clone();
            async move { d.drain().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        publisher.gate.add_permits(3);
        waiter.await.unwrap();
        assert_eq!(d.metrics().completed("t", "OK"), 3);
        assert_eq!(d.metrics().outstanding("t"), 0);
    }

    #[tokio::test]
    async fn test_aborted_publish_releases_gauge() {
        let publisher = GatedPublisher::new(0);
        let d = dispatcher(publisher);

        let h = d.dispatch("t", b"x".to_vec());
        while d.metrics().outstanding("t") == 0 {
            tokio::task::yield_now().await;
        }
        h.abort();
        assert!(h.await.unwrap_err().is_cancelled());
        assert_eq!(d.metrics().outstanding("t"), 0);
        assert_eq!(d.metrics().completed("t", "OK"), 0);
    }
}
