use anyhow::{Context, Result, bail};
use tokio::sync::mpsc;

use crate::adapter::{Adapter, NdjsonAdapter};
use crate::aggregator::Aggregator;
use crate::source::{EventSource, SourceEvent};

/// Stream `source` through the NDJSON adapter into `aggregator` until the
/// source is exhausted.
///
/// Fails on the first adapter or protocol error, and when the stream ends
/// before `runEnd` was seen.
pub async fn drive(source: Box<dyn EventSource>, aggregator: &mut Aggregator) -> Result<()> {
    let name = source.name().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move { source.stream(tx).await });

    let mut adapter = NdjsonAdapter::new();
    let mut line_no = 0usize;
    let fed = feed_all(&mut rx, &mut adapter, aggregator, &name, &mut line_no).await;
    if let Err(e) = fed {
        // Stop the producer now so a spawned command is killed with it.
        handle.abort();
        let _ = handle.await;
        return Err(e);
    }

    handle
        .await
        .with_context(|| format!("{} task failed", name))??;

    if !aggregator.is_finished() {
        bail!("{} ended before runEnd", name);
    }
    tracing::debug!(
        source = %name,
        adapter = adapter.name(),
        lines = line_no,
        skipped = adapter.skipped_lines(),
        "stream complete"
    );
    Ok(())
}

async fn feed_all(
    rx: &mut mpsc::UnboundedReceiver<SourceEvent>,
    adapter: &mut NdjsonAdapter,
    aggregator: &mut Aggregator,
    name: &str,
    line_no: &mut usize,
) -> Result<()> {
    while let Some(event) = rx.recv().await {
        match event {
            SourceEvent::Line(line) => {
                *line_no += 1;
                adapter
                    .feed_line(&line, aggregator)
                    .with_context(|| format!("{} line {}", name, line_no))?;
            }
            SourceEvent::Error { message } => {
                tracing::error!(source = %name, %message, "source reported an error");
            }
        }
    }
    Ok(())
}
