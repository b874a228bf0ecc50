//! Test runner lifecycle events.
//!
//! A host runner reports its progress as a sequence of [`RunnerEvent`]s.
//! Runners that cannot link against this crate can write the events as
//! JSON lines, one object per line, tagged by `event`:
//!
//! ```text
//! {"event": "run_begin"}
//! {"event": "pass", "title": "login works C100", "duration_ms": 412}
//! {"event": "fail", "title": "logout fails C200", "error": "boom"}
//! {"event": "pending", "title": "C300 export", "reason": "not implemented"}
//! {"event": "run_end"}
//! ```
//!
//! [`replay`] reads such a stream and delivers each event to a
//! [`Reporter`], awaiting every handler before reading the next line.
//! Lines that are not events are skipped with a warning.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::report::Reporter;

/// Result type for event stream operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors raised while reading an event stream.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Failed to read events: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid event on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

/// A lifecycle event of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// The run started. Fires once, before any test.
    RunBegin,

    /// A test passed.
    Pass {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// A test failed.
    Fail {
        title: String,
        #[serde(default)]
        error: String,
    },

    /// A test was skipped or is pending.
    Pending {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// The run finished. Fires once, after all tests.
    RunEnd,
}

impl RunnerEvent {
    /// Delivers this event to `reporter`.
    pub async fn dispatch(&self, reporter: &dyn Reporter) {
        match self {
            RunnerEvent::RunBegin => reporter.on_run_begin().await,
            RunnerEvent::Pass { title, duration_ms } => {
                reporter
                    .on_test_pass(title, duration_ms.map(Duration::from_millis))
                    .await
            }
            RunnerEvent::Fail { title, error } => reporter.on_test_fail(title, error).await,
            RunnerEvent::Pending { title, reason } => {
                reporter.on_test_pending(title, reason.as_deref()).await
            }
            RunnerEvent::RunEnd => reporter.on_run_end().await,
        }
    }
}

/// Parses one line of an event stream. Blank lines yield `None`.
pub fn parse_line(line_no: usize, line: &str) -> EventResult<Option<RunnerEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| EventError::Parse {
            line: line_no,
            source,
        })
}

/// Reads a JSON-lines event stream and dispatches every event in order.
///
/// Returns the number of events delivered. Malformed lines are logged with
/// their line number and skipped, so stray output in a piped stream does
/// not cost the results around it.
pub async fn replay<R>(reader: R, reporter: &dyn Reporter) -> EventResult<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut delivered = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_line(line_no, &line) {
            Ok(Some(event)) => {
                debug!("Dispatching {:?}", event);
                event.dispatch(reporter).await;
                delivered += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("Skipping {}", e),
        }
    }

    Ok(delivered)
}
