use anyhow::Result;
use async_trait::async_trait;
use logbridge_core::{Operator, Publisher};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// Writes each message as a `topic<TAB>payload` line. Useful for dry runs of
/// a forward pipeline.
pub struct LinePublisher<W> {
    id: String,
    writer: Mutex<W>,
}

impl LinePublisher<Stdout> {
    pub fn stdout(id: impl Into<String>) -> Self {
        Self::new(id, tokio::io::stdout())
    }
}

impl<W> LinePublisher<W> {
    pub fn new(id: impl Into<String>, writer: W) -> Self {
        Self {
            id: id.into(),
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Send> Operator for LinePublisher<W> {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl<W> Publisher for LinePublisher<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(topic.len() + payload.len() + 2);
        line.extend_from_slice(topic.as_bytes());
        line.push(b'\t');
        line.extend_from_slice(payload);
        line.push(b'\n');

        // one write per message keeps concurrent publishes from interleaving
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
