use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use super::{EventSource, SourceEvent, read_line_lossy};

/// Reads the raw stream piped into this process.
pub struct StdinSource;

#[async_trait]
impl EventSource for StdinSource {
    async fn stream(&self, tx: mpsc::UnboundedSender<SourceEvent>) -> Result<()> {
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut buf = Vec::new();
        while let Some(line) = read_line_lossy(&mut reader, &mut buf)
            .await
            .context("failed to read stdin")?
        {
            if tx.send(SourceEvent::Line(line)).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "stdin"
    }
}
