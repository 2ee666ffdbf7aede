use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use logbridge_core::{KafkaSourceSpec, Operator, PayloadTx, Source};
use rdkafka::ClientConfig;
use rdkafka::Message as KafkaMessage;
use rdkafka::consumer::{Consumer, StreamConsumer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Consumes a Kafka topic and emits each message payload as is.
pub struct KafkaSource {
    spec: KafkaSourceSpec,
}

impl KafkaSource {
    pub fn new(spec: KafkaSourceSpec) -> Self {
        Self { spec }
    }

    fn consumer(&self) -> Result<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.spec.brokers)
            .set("group.id", &self.spec.group_id)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "true")
            .create()?;
        consumer.subscribe(&[&self.spec.topic])?;
        Ok(consumer)
    }
}

impl Operator for KafkaSource {
    fn name(&self) -> &str {
        &self.spec.id
    }
}

#[async_trait]
impl Source for KafkaSource {
    async fn run(&mut self, tx: PayloadTx, cancel: CancellationToken) -> Result<()> {
        let consumer = self.consumer()?;
        info!(source = %self.spec.id, topic = %self.spec.topic, "subscribed");
        let mut stream = consumer.stream();
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                m = stream.next() => match m {
                    Some(m) => m,
                    None => break,
                },
            };
            let payload = match message {
                Ok(m) => match m.payload() {
                    Some(p) => p.to_vec(),
                    None => continue,
                },
                Err(e) => {
                    warn!(source = %self.spec.id, error = ?e, "kafka error on consuming message from broker");
                    continue;
                }
            };
            if tx.send(payload).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
