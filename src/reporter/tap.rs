use std::io::Write;

use anyhow::{Context, Result, bail};
use serde_json::{Number, Value};

use super::Reporter;
use crate::models::{DEFAULT_ERROR_MESSAGE, Payload, Suite, Test, TestError, TestStatus};

/// Writes the canonical stream as TAP version 13.
///
/// The test number is global across the run: nesting never resets it.
pub struct TapReporter<W: Write> {
    out: W,
    test_count: usize,
}

impl<W: Write> TapReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, test_count: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn write_error(&mut self, error: &TestError, severity: TestStatus) -> Result<()> {
        let message = if error.message.is_empty() {
            DEFAULT_ERROR_MESSAGE
        } else {
            error.message.as_str()
        };

        writeln!(self.out, "  ---")?;
        writeln!(self.out, "  message: \"{}\"", escape(message))?;
        writeln!(self.out, "  severity: {}", severity)?;
        if let Some(actual) = &error.actual {
            writeln!(self.out, "  actual: {}", render_payload(actual)?)?;
        }
        if let Some(expected) = &error.expected {
            writeln!(self.out, "  expected: {}", render_payload(expected)?)?;
        }
        if let Some(stack) = error.stack.as_deref().filter(|s| !s.is_empty()) {
            writeln!(self.out, "  stack: \"{}\"", escape(stack))?;
        }
        writeln!(self.out, "  ...")?;
        Ok(())
    }
}

impl<W: Write> Reporter for TapReporter<W> {
    fn name(&self) -> &str {
        "tap"
    }

    fn on_run_start(&mut self, _run: &Suite) -> Result<()> {
        writeln!(self.out, "TAP version 13")?;
        Ok(())
    }

    fn on_test_end(&mut self, test: &Test) -> Result<()> {
        self.test_count += 1;
        let n = self.test_count;
        let name = test.full_name.join(" > ");

        match test.status {
            Some(TestStatus::Passed) => writeln!(self.out, "ok {} {}", n, name)?,
            Some(TestStatus::Skipped) => writeln!(self.out, "ok {} # SKIP {}", n, name)?,
            Some(TestStatus::Todo) => {
                writeln!(self.out, "not ok {} # TODO {}", n, name)?;
                for error in &test.errors {
                    self.write_error(error, TestStatus::Todo)?;
                }
            }
            Some(TestStatus::Failed) | None => {
                writeln!(self.out, "not ok {} {}", n, name)?;
                for error in &test.errors {
                    self.write_error(error, TestStatus::Failed)?;
                }
            }
        }
        Ok(())
    }

    fn on_run_end(&mut self, run: &Suite) -> Result<()> {
        let counts = &run.test_counts;
        writeln!(self.out, "1..{}", counts.total)?;
        writeln!(self.out, "# pass {}", counts.passed)?;
        writeln!(self.out, "# skip {}", counts.skipped)?;
        writeln!(self.out, "# todo {}", counts.todo)?;
        writeln!(self.out, "# fail {}", counts.failed)?;
        self.out.flush().context("failed to flush TAP output")?;
        Ok(())
    }
}

/// Quoted JSON (2-space indent) for a present value, bare `undefined` otherwise.
fn render_payload(payload: &Payload) -> Result<String> {
    match payload {
        Payload::Undefined => Ok("undefined".to_string()),
        Payload::Value(value) => {
            let mut value = value.clone();
            integral_floats(&mut value);
            let json = serde_json::to_string_pretty(&value)
                .context("failed to serialize error payload")?;
            Ok(format!("\"{}\"", escape(&json)))
        }
    }
}

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Print whole floats the way JavaScript does: `1`, not `1.0`.
fn integral_floats(value: &mut Value) {
    match value {
        Value::Number(n) if n.is_f64() => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
                *n = Number::from(f as i64);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(integral_floats),
        Value::Object(map) => map.values_mut().for_each(integral_floats),
        _ => {}
    }
}

fn is_safe(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{7e}'
        | '\u{85}'
        | '\u{a0}'..='\u{d7ff}'
        | '\u{e000}'..='\u{fffd}')
}

/// Escape `s` for embedding in a double-quoted TAP string.
///
/// Characters outside the safe set become `\uXXXX` per UTF-16 code unit, so
/// astral code points come out as a surrogate pair of escapes.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut units = [0u16; 2];
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c if is_safe(c) => out.push(c),
            c => {
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out
}

/// Inverse of [`escape`].
pub fn unescape(s: &str) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u16; 2];
            units.extend_from_slice(c.encode_utf16(&mut buf));
            continue;
        }
        match chars.next() {
            Some('\\') => units.push(u16::from(b'\\')),
            Some('"') => units.push(u16::from(b'"')),
            Some('n') => units.push(u16::from(b'\n')),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    bail!("truncated \\u escape");
                }
                let unit = u16::from_str_radix(&hex, 16)
                    .with_context(|| format!("invalid \\u escape '{}'", hex))?;
                units.push(unit);
            }
            Some(other) => bail!("unknown escape '\\{}'", other),
            None => bail!("dangling backslash"),
        }
    }
    String::from_utf16(&units).context("unpaired surrogate in escaped string")
}
