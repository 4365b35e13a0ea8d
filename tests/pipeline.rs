use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use canonreport::source::{CommandSource, EventSource, SourceEvent};
use canonreport::{Aggregator, TapReporter, TestStatus, pipeline};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

struct Lines(Vec<&'static str>);

#[async_trait]
impl EventSource for Lines {
    async fn stream(&self, tx: mpsc::UnboundedSender<SourceEvent>) -> Result<()> {
        for line in &self.0 {
            let _ = tx.send(SourceEvent::Line(line.to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

#[tokio::test]
async fn ndjson_stream_becomes_tap() {
    let source = Lines(vec![
        r#"{"type":"run-start"}"#,
        r#"{"type":"suite-start","name":"parser"}"#,
        r#"{"type":"test-start","name":"reads numbers"}"#,
        r#"{"type":"test-end","status":"passed","runtime":0.4}"#,
        r#"{"type":"test-start","name":"reads strings"}"#,
        r#"{"type":"test-end","status":"failed","runtime":1.1,"errors":[{"message":"expected \"a\"","actual":"b","expected":"a"}]}"#,
        r#"{"type":"suite-end"}"#,
        r#"{"type":"run-end"}"#,
    ]);

    let tap = Rc::new(RefCell::new(TapReporter::new(Vec::new())));
    let mut aggregator = Aggregator::new();
    aggregator.register(Rc::clone(&tap));

    pipeline::drive(Box::new(source), &mut aggregator)
        .await
        .unwrap();

    let out = String::from_utf8(tap.borrow().get_ref().clone()).unwrap();
    assert_eq!(
        out,
        concat!(
            "TAP version 13\n",
            "ok 1 parser > reads numbers\n",
            "not ok 2 parser > reads strings\n",
            "  ---\n",
            "  message: \"expected \\\"a\\\"\"\n",
            "  severity: failed\n",
            "  actual: \"\\\"b\\\"\"\n",
            "  expected: \"\\\"a\\\"\"\n",
            "  ...\n",
            "1..2\n",
            "# pass 1\n",
            "# skip 0\n",
            "# todo 0\n",
            "# fail 1\n",
        )
    );
    assert_eq!(
        aggregator.run().unwrap().status,
        Some(TestStatus::Failed)
    );
}

#[tokio::test]
async fn truncated_stream_is_an_error() {
    let source = Lines(vec![
        r#"{"type":"run-start"}"#,
        r#"{"type":"suite-start","name":"never closed"}"#,
    ]);
    let mut aggregator = Aggregator::new();

    let err = pipeline::drive(Box::new(source), &mut aggregator)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "fixture ended before runEnd");
}

#[tokio::test]
async fn protocol_violation_names_the_line() {
    let source = Lines(vec![
        "starting tests...",
        r#"{"type":"run-start"}"#,
        r#"{"type":"suite-end"}"#,
    ]);
    let mut aggregator = Aggregator::new();

    let err = pipeline::drive(Box::new(source), &mut aggregator)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "fixture line 3");
    assert_eq!(
        format!("{:#}", err),
        "fixture line 3: suiteEnd called with no open suite"
    );
}

/// Sends its lines, then stays open until dropped.
struct Hanging {
    lines: Vec<&'static str>,
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventSource for Hanging {
    async fn stream(&self, tx: mpsc::UnboundedSender<SourceEvent>) -> Result<()> {
        let _guard = SetOnDrop(Arc::clone(&self.dropped));
        for line in &self.lines {
            let _ = tx.send(SourceEvent::Line(line.to_string()));
        }
        std::future::pending::<()>().await;
        Ok(())
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

#[tokio::test]
async fn failed_intake_stops_the_producer() {
    let dropped = Arc::new(AtomicBool::new(false));
    let source = Hanging {
        lines: vec![r#"{"type":"run-start"}"#, r#"{"type":"test-end","status":"passed"}"#],
        dropped: Arc::clone(&dropped),
    };
    let mut aggregator = Aggregator::new();

    let err = pipeline::drive(Box::new(source), &mut aggregator)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "hanging line 2");
    assert!(dropped.load(Ordering::SeqCst));
}

#[cfg(unix)]
#[tokio::test]
async fn non_utf8_banner_is_skipped() {
    let source = CommandSource::new(
        "sh",
        vec![
            "-c".into(),
            r#"printf 'banner \377\n{"type":"run-start"}\n{"type":"run-end"}\n'"#.into(),
        ],
    );
    let tap = Rc::new(RefCell::new(TapReporter::new(Vec::new())));
    let mut aggregator = Aggregator::new();
    aggregator.register(Rc::clone(&tap));

    pipeline::drive(Box::new(source), &mut aggregator)
        .await
        .unwrap();

    let out = String::from_utf8(tap.borrow().get_ref().clone()).unwrap();
    assert_eq!(
        out,
        "TAP version 13\n1..0\n# pass 0\n# skip 0\n# todo 0\n# fail 0\n"
    );
    assert_eq!(
        aggregator.run().unwrap().status,
        Some(TestStatus::Skipped)
    );
}
