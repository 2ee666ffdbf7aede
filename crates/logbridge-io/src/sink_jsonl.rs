use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use logbridge_core::{Operator, Row, RowSink, Schema};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tracing::debug;

/// Writes every row as one JSON object per line, keyed by column name.
pub struct JsonLinesSink<W> {
    id: String,
    schema: Schema,
    writer: W,
    buf: Vec<u8>,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout(id: impl Into<String>, schema: Schema) -> Self {
        Self::new(id, schema, tokio::io::stdout())
    }
}

impl JsonLinesSink<File> {
    /// Append to `path`, creating it and its parent directories as needed.
    pub async fn append_file(
        id: impl Into<String>,
        path: impl AsRef<Path>,
        schema: Schema,
    ) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        Ok(Self::new(id, schema, file))
    }
}

impl<W> JsonLinesSink<W> {
    pub fn new(id: impl Into<String>, schema: Schema, writer: W) -> Self {
        Self {
            id: id.into(),
            schema,
            writer,
            buf: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Send + Sync> Operator for JsonLinesSink<W> {
    fn name(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl<W> RowSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn insert(&mut self, rows: &[Row]) -> Result<()> {
        self.buf.clear();
        for row in rows {
            serde_json::to_writer(&mut self.buf, &self.schema.render_row(row))?;
            self.buf.push(b'\n');
        }
        self.writer.write_all(&self.buf).await?;
        self.writer.flush().await?;
        debug!(sink = %self.id, rows = rows.len(), bytes = self.buf.len(), "batch written");
        Ok(())
    }
}
