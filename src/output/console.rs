//! Line-oriented console rendering of probe results

use std::io::{self, Stdout, Write};

use tracing::warn;

use super::ResultSink;
use crate::models::{ProbeOutcome, ProbeResult, ResponsePayload};

const SUCCESS_MARK: &str = "✓";
const FAILURE_MARK: &str = "✗";
const SEPARATOR: &str = "----------------------------------------";

/// Writes each probe as a header line, detail lines and a separator
pub struct ConsoleSink<W: Write> {
    writer: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResultSink for ConsoleSink<W> {
    fn record(&mut self, result: &ProbeResult) {
        let mut text = render(result).join("\n");
        text.push('\n');
        let written = self
            .writer
            .write_all(text.as_bytes())
            .and_then(|_| self.writer.flush());
        if let Err(e) = written {
            warn!("Failed to write probe result: {}", e);
        }
    }
}

/// Render a result as output lines
pub fn render(result: &ProbeResult) -> Vec<String> {
    let mark = if result.is_success() {
        SUCCESS_MARK
    } else {
        FAILURE_MARK
    };

    let mut lines = vec![format!(
        "[{}] {} {} - {:.2}ms",
        result.timestamp_iso(),
        mark,
        result.target,
        result.latency_ms
    )];

    match &result.outcome {
        ProbeOutcome::Success {
            response: ResponsePayload::Raw { status, body },
        } => {
            lines.push(format!("Status: {}", status));
            lines.push(format!("Body: {}", body));
        }
        ProbeOutcome::Success {
            response: ResponsePayload::Json { payload, .. },
        } => {
            lines.push(format!("First listed at: {}", payload.first_listed_at()));
            lines.push(format!("Category: {}", payload.category()));
            lines.push(format!("Title: {}", payload.title()));
        }
        ProbeOutcome::Failure { error } => {
            lines.push(format!("Error: {}", error));
        }
    }

    lines.push(SEPARATOR.to_string());
    lines
}
