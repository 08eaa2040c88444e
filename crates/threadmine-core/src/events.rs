//! Typed progress events and the per-run reporting channel.
//!
//! Each run has exactly one producer (the run controller) writing typed
//! events to an mpsc channel; the transport layer (SSE, WebSocket, message
//! queue) drains the receiver. This keeps pipeline logic fully decoupled
//! from transport choice, and the single-producer channel guarantees strict
//! per-run emission order. Consumers multiplexing several runs must preserve
//! per-run order themselves.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ErrorCategory;
use crate::models::{RunPhase, RunStats};

/// One event in a run's progress stream.
///
/// Serialized as JSON with a `type` tag field, e.g.:
/// `{"type":"phase","name":"searching"}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run entered a new phase.
    Phase { name: RunPhase },
    /// Free-form progress statistic (running counters, sizes).
    Stat {
        key: String,
        value: serde_json::Value,
    },
    /// Non-fatal issue; the run continues.
    Warning { message: String },
    /// Token/cost accounting for one external generation call.
    Cost {
        tokens_in: i64,
        tokens_out: i64,
        cumulative_cost: f64,
    },
    /// Terminal failure with a user-facing category.
    Error {
        message: String,
        category: ErrorCategory,
    },
    /// Terminal success with the final statistics snapshot.
    Complete { stats: RunStats },
}

impl RunEvent {
    /// Event type name matching the wire tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::Phase { .. } => "phase",
            RunEvent::Stat { .. } => "stat",
            RunEvent::Warning { .. } => "warning",
            RunEvent::Cost { .. } => "cost",
            RunEvent::Error { .. } => "error",
            RunEvent::Complete { .. } => "complete",
        }
    }

    /// Whether this event ends the stream.
    ///
    /// `complete` and `error` are terminal, and so is the `stopped` phase:
    /// a cancelled run emits `phase{stopped}` as its final event.
    pub fn is_terminal(&self) -> bool {
        match self {
            RunEvent::Error { .. } | RunEvent::Complete { .. } => true,
            RunEvent::Phase { name } => *name == RunPhase::Stopped,
            _ => false,
        }
    }
}

/// Create a progress channel for one run.
pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<RunEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

/// Single-producer handle for emitting a run's progress events.
///
/// Emission is best-effort: if the consumer is gone the event is dropped and
/// the run keeps going, matching the cancellation contract (results of work
/// nobody is watching are discarded, the work itself is not killed).
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl EventSender {
    pub fn emit(&self, event: RunEvent) {
        tracing::debug!(event_type = event.event_type(), "run event");
        let _ = self.tx.send(event);
    }

    pub fn phase(&self, name: RunPhase) {
        self.emit(RunEvent::Phase { name });
    }

    pub fn stat(&self, key: &str, value: impl Into<serde_json::Value>) {
        self.emit(RunEvent::Stat {
            key: key.to_string(),
            value: value.into(),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(RunEvent::Warning {
            message: message.into(),
        });
    }

    pub fn cost(&self, tokens_in: i64, tokens_out: i64, cumulative_cost: f64) {
        self.emit(RunEvent::Cost {
            tokens_in,
            tokens_out,
            cumulative_cost,
        });
    }

    pub fn error(&self, err: &crate::Error) {
        self.emit(RunEvent::Error {
            message: err.to_string(),
            category: err.category(),
        });
    }

    pub fn complete(&self, stats: RunStats) {
        self.emit(RunEvent::Complete { stats });
    }
}
