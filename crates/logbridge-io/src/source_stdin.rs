use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use logbridge_core::{Operator, PayloadTx, Source};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Newline-delimited payloads read from a byte stream, stdin by default.
/// Blank lines are skipped.
pub struct LineSource<R> {
    id: String,
    reader: Option<R>,
}

impl LineSource<BufReader<Stdin>> {
    pub fn stdin(id: impl Into<String>) -> Self {
        Self::new(id, BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineSource<R> {
    pub fn new(id: impl Into<String>, reader: R) -> Self {
        Self {
            id: id.into(),
            reader: Some(reader),
        }
    }
}

impl<R: Send + Sync> Operator for LineSource<R> {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl<R> Source for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send + Sync,
{
    async fn run(&mut self, tx: PayloadTx, cancel: CancellationToken) -> Result<()> {
        let reader = self
            .reader
            .take()
            .with_context(|| format!("source {} already ran", self.id))?;
        let mut lines = LinesStream::new(reader.lines());
        let mut sent = 0u64;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next() => match line {
                    Some(line) => line.with_context(|| format!("read from source {}", self.id))?,
                    None => break,
                },
            };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(line.into_bytes()).await.is_err() {
                debug!(source = %self.id, "receiver dropped");
                break;
            }
            sent += 1;
        }
        info!(source = %self.id, sent, "source finished");
        Ok(())
    }
}
