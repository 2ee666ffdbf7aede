use anyhow::Result;
use async_trait::async_trait;
use logbridge_core::{KafkaPublisherSpec, Operator, Publisher};
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

/// Publishes to Kafka and waits for the delivery report.
pub struct KafkaPublisher {
    id: String,
    producer: FutureProducer,
}

impl KafkaPublisher {
    pub fn new(spec: &KafkaPublisherSpec) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &spec.brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self {
            id: spec.id.clone(),
            producer,
        })
    }
}

impl Operator for KafkaPublisher {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.producer
            .send(FutureRecord::<(), [u8]>::to(topic).payload(payload), Timeout::Never)
            .await
            .map_err(|(e, _)| anyhow::Error::new(e))?;
        Ok(())
    }
}
