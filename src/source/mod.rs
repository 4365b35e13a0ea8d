pub mod command;
pub mod stdin;

use std::borrow::Cow;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::config::Config;

pub use command::CommandSource;
pub use stdin::StdinSource;

/// What a source pushes to the intake loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One line of the raw NDJSON event stream.
    Line(String),
    /// The source hit a problem it could not recover from by itself.
    Error { message: String },
}

/// Producer of raw event lines for the NDJSON adapter.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Stream every line until the underlying input is exhausted.
    async fn stream(&self, tx: mpsc::UnboundedSender<SourceEvent>) -> Result<()>;

    /// Display name for this source (e.g., "stdin").
    fn name(&self) -> &str;
}

/// Read one line without its `\n` or `\r\n`; `None` at end of input.
///
/// Bytes that are not UTF-8 are replaced rather than failing the stream, so a
/// noisy banner line reaches the adapter and is skipped there like any other.
pub(crate) async fn read_line_lossy<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    let line = match String::from_utf8_lossy(buf) {
        Cow::Borrowed(line) => line.to_string(),
        Cow::Owned(line) => {
            tracing::debug!(%line, "replaced invalid UTF-8 in source line");
            line
        }
    };
    Ok(Some(line))
}

/// Pick the source: positional arguments win, then `[source] command`, then stdin.
pub fn detect(config: &Config, args: Vec<String>) -> Result<Box<dyn EventSource>> {
    if let Some(source) = CommandSource::from_args(args) {
        return Ok(Box::new(source));
    }
    if let Some(line) = config.source.command.as_deref() {
        return Ok(Box::new(CommandSource::from_command_line(line)?));
    }
    Ok(Box::new(StdinSource))
}
