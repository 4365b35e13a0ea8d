use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{EventSource, SourceEvent, read_line_lossy};

/// Guard that kills the child process (and its entire process group) on drop.
struct ChildGuard {
    child: Option<tokio::process::Child>,
    /// Process group ID saved at spawn time so we can kill the whole group.
    #[cfg(unix)]
    pgid: Option<u32>,
}

impl ChildGuard {
    fn new(child: tokio::process::Child) -> Self {
        #[cfg(unix)]
        let pgid = child.id();
        Self {
            child: Some(child),
            #[cfg(unix)]
            pgid,
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Runners fork workers; take the whole group down so none are orphaned.
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
        }
        if let Some(ref mut child) = self.child {
            let _ = child.start_kill();
        }
    }
}

/// Spawns a test command whose stdout carries the raw NDJSON stream.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from positional CLI arguments; `None` when there are none.
    pub fn from_args(args: Vec<String>) -> Option<Self> {
        let mut args = args.into_iter();
        let program = args.next()?;
        Some(Self::new(program, args.collect()))
    }

    /// Split a shell-style command line such as `npx mocha --reporter ndjson`.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let words = shell_words::split(line)
            .with_context(|| format!("invalid source command: {}", line))?;
        Self::from_args(words).context("source command is empty")
    }
}

#[async_trait]
impl EventSource for CommandSource {
    async fn stream(&self, tx: mpsc::UnboundedSender<SourceEvent>) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        tracing::debug!(program = %self.program, args = ?self.args, "spawning source command");

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.as_std_mut().process_group(0);
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program))?;

        let stdout = child.stdout.take().context("missing stdout")?;
        let stderr = child.stderr.take().context("missing stderr")?;

        // The guard holds the child until exit so an aborted stream still kills it.
        let mut child_guard = ChildGuard::new(child);

        let stderr_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = read_line_lossy(&mut reader, &mut buf).await {
                tracing::debug!(target: "canonreport::source::stderr", "{}", line);
            }
        });

        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = read_line_lossy(&mut reader, &mut buf)
            .await
            .context("failed to read command output")?
        {
            if tx.send(SourceEvent::Line(line)).is_err() {
                break;
            }
        }

        stderr_handle.await.ok();

        if let Some(ref mut child) = child_guard.child {
            let status = child
                .wait()
                .await
                .with_context(|| format!("failed to wait for {}", self.program))?;
            if !status.success() {
                let _ = tx.send(SourceEvent::Error {
                    message: format!(
                        "{} exited with code {}",
                        self.program,
                        status.code().unwrap_or(-1)
                    ),
                });
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_lines() {
        let source = CommandSource::from_command_line("npx mocha --grep 'two words'").unwrap();
        assert_eq!(source.program, "npx");
        assert_eq!(source.args, vec!["mocha", "--grep", "two words"]);

        assert!(CommandSource::from_command_line("").is_err());
        assert!(CommandSource::from_command_line("unterminated 'quote").is_err());
    }

    #[test]
    fn no_args_means_no_command() {
        assert!(CommandSource::from_args(Vec::new()).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_stdout_lines_and_exit_code() {
        let source = CommandSource::new(
            "sh",
            vec![
                "-c".into(),
                "echo first; echo noise >&2; echo second; exit 3".into(),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.stream(tx).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SourceEvent::Line("first".into()),
                SourceEvent::Line("second".into()),
                SourceEvent::Error {
                    message: "sh exited with code 3".into()
                },
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_output_does_not_end_the_stream() {
        let source = CommandSource::new(
            "sh",
            vec![
                "-c".into(),
                r#"printf 'banner \377\n{"type":"run-start"}\n{"type":"run-end"}\n'"#.into(),
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.stream(tx).await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SourceEvent::Line("banner \u{fffd}".into()),
                SourceEvent::Line(r#"{"type":"run-start"}"#.into()),
                SourceEvent::Line(r#"{"type":"run-end"}"#.into()),
            ]
        );
    }
}
