use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logbridge_core::{
    LoadSpec, PayloadRx, PipelineSpec, Publisher, PublisherSpec, RowSink, Schema, SinkSpec,
    Source, SourceSpec, StageSpec,
};
use logbridge_io::buffer::{self, BatchConfig};
use logbridge_io::dispatch::Dispatcher;
use logbridge_io::forward::Forwarder;
use logbridge_io::ingest::Ingestor;
use logbridge_io::metrics::{self, BufferMetrics, ForwardMetrics, IngestMetrics, PublishMetrics};
use logbridge_io::publish_stdout::LinePublisher;
use logbridge_io::sink_jsonl::JsonLinesSink;
use logbridge_io::source_stdin::LineSource;
use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "logbridge", about = "Relay structured log messages into batches or onto a broker")]
struct Args {
    /// Pipeline YAML
    #[arg(short, long)]
    pipeline: PathBuf,
    /// Bounded channel capacity between the source and the stage
    #[arg(long, default_value_t = 8)]
    channel_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
    let args = Args::parse();
    let spec = PipelineSpec::from_path(&args.pipeline)?;
    info!(pipeline = %spec.name, "starting");

    let registry = Registry::new();
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(args.channel_capacity.max(1));

    let mut source = build_source(&spec.source)?;
    let stage_handles = match &spec.stage {
        StageSpec::Load(load) => spawn_load(load, rx, &registry, &cancel).await?,
        StageSpec::Forward(forward) => {
            let publisher = build_publisher(&forward.publisher)?;
            let dispatcher = Dispatcher::new(publisher, PublishMetrics::register(&registry)?);
            let mut forwarder = Forwarder::new(
                dispatcher,
                forward.topic.clone(),
                ForwardMetrics::register(&registry)?,
            );
            if let Some(field) = &forward.received_timestamp_field {
                forwarder = forwarder.with_received_timestamp(field.clone());
            }
            let c = cancel.child_token();
            vec![tokio::spawn(forwarder.run(rx, c))]
        }
    };
    let c = cancel.child_token();
    let src_handle = tokio::spawn(async move { source.run(tx, c).await });

    // Ctrl-C handling
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                info!("interrupted, shutting down");
                cancel.cancel();
            }
        }
    });

    // Join
    src_handle.await??;
    for handle in stage_handles {
        handle.await??;
    }
    info!("metrics at exit:\n{}", metrics::encode_text(&registry)?);
    Ok(())
}

fn build_source(spec: &SourceSpec) -> Result<Box<dyn Source>> {
    let source: Box<dyn Source> = match spec {
        SourceSpec::Stdin { id } => Box::new(LineSource::stdin(id.clone())),
        #[cfg(feature = "kafka")]
        SourceSpec::Kafka(kafka) => {
            Box::new(logbridge_io::source_kafka::KafkaSource::new(kafka.clone()))
        }
        #[cfg(not(feature = "kafka"))]
        SourceSpec::Kafka(kafka) => {
            anyhow::bail!("source {} needs a build with the `kafka` feature", kafka.id)
        }
    };
    Ok(source)
}

fn build_publisher(spec: &PublisherSpec) -> Result<Arc<dyn Publisher>> {
    let publisher: Arc<dyn Publisher> = match spec {
        PublisherSpec::Stdout { id } => Arc::new(LinePublisher::stdout(id.clone())),
        #[cfg(feature = "kafka")]
        PublisherSpec::Kafka(kafka) => {
            Arc::new(logbridge_io::publish_kafka::KafkaPublisher::new(kafka)?)
        }
        #[cfg(not(feature = "kafka"))]
        PublisherSpec::Kafka(kafka) => {
            anyhow::bail!("publisher {} needs a build with the `kafka` feature", kafka.id)
        }
    };
    Ok(publisher)
}

async fn build_sink(spec: &SinkSpec, schema: Schema) -> Result<Box<dyn RowSink>> {
    let sink: Box<dyn RowSink> = match spec {
        SinkSpec::Stdout { id } => Box::new(JsonLinesSink::stdout(id.clone(), schema)),
        SinkSpec::JsonlFile { id, path } => {
            Box::new(JsonLinesSink::append_file(id.clone(), path, schema).await?)
        }
    };
    Ok(sink)
}

fn load_schema(path: &Path) -> Result<Schema> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read schema {}", path.display()))?;
    Schema::from_json_str(&s).with_context(|| format!("parse schema {}", path.display()))
}

/// source → ingest → batch buffer → sink
async fn spawn_load(
    load: &LoadSpec,
    rx: PayloadRx,
    registry: &Registry,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<Result<()>>>> {
    let schema = load_schema(Path::new(&load.schema_path))?;
    let record = logbridge_tx::compile(&schema)
        .with_context(|| format!("compile schema {}", load.schema_path))?;
    info!(columns = record.count(), schema = %load.schema_path, "schema compiled");

    let sink = build_sink(&load.sink, schema).await?;
    let (rows, buffer) = buffer::channel(
        BatchConfig::from(&load.batch),
        sink,
        BufferMetrics::register(registry)?,
    )?;
    let ingestor = Ingestor::new(Arc::new(record), rows, IngestMetrics::register(registry)?);

    let c1 = cancel.child_token();
    let ingest_handle = tokio::spawn(ingestor.run(rx, c1));
    let c2 = cancel.child_token();
    let buffer_handle = tokio::spawn(buffer.run(c2));
    Ok(vec![ingest_handle, buffer_handle])
}
