//! Bridge Events
//!
//! Wire types for the events exchanged with the transport layer, and the
//! broadcast-backed emitter used by the bridge internals.
//!
//! Every outbound event is tagged with the connection id it belongs to, so
//! a transport can detect and discard events for a connection it has
//! already dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::protocol::DEFAULT_PROMPT;

/// Exit status reported when the real status could not be obtained.
pub const STATUS_UNAVAILABLE: i32 = -1;

/// Events produced by the bridge for the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// One classified output line, trailing newline included.
    Stdout { connection_id: String, text: String },

    /// The child is blocked waiting for one line of input; the client
    /// should prompt the user and reply with a `stdin` event.
    StdinRequest { connection_id: String, prompt: String },

    /// The process terminated. Always the last event of a run; `status` is
    /// the exit code, or a negative sentinel if it could not be determined.
    ExecEnd { connection_id: String, status: i32 },
}

impl BridgeEvent {
    /// Get the connection id from any event.
    pub fn connection_id(&self) -> &str {
        match self {
            Self::Stdout { connection_id, .. } => connection_id,
            Self::StdinRequest { connection_id, .. } => connection_id,
            Self::ExecEnd { connection_id, .. } => connection_id,
        }
    }
}

/// Events consumed from the transport layer, one connection each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Begin a new run, replacing any prior run on this connection.
    ExecStart { code: String },
    /// Deliver text to the running child's input stream.
    Stdin { text: String },
    /// Connection ended; tear down its session.
    Disconnect,
}

/// Event emitter handed to session pumps.
///
/// Backed by a broadcast channel owned by the session manager; sends are
/// best-effort and events are dropped when no transport is subscribed.
#[derive(Debug, Clone)]
pub struct BridgeEventEmitter {
    tx: broadcast::Sender<BridgeEvent>,
}

impl BridgeEventEmitter {
    /// Create an emitter over an existing broadcast sender.
    pub fn new(tx: broadcast::Sender<BridgeEvent>) -> Self {
        Self { tx }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: BridgeEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit one output line to a connection.
    pub fn emit_stdout(&self, connection_id: &str, text: impl Into<String>) {
        self.emit(BridgeEvent::Stdout {
            connection_id: connection_id.to_string(),
            text: text.into(),
        });
    }

    /// Emit an input request to a connection.
    pub fn emit_stdin_request(&self, connection_id: &str, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let prompt = if prompt.is_empty() {
            DEFAULT_PROMPT.to_string()
        } else {
            prompt
        };
        self.emit(BridgeEvent::StdinRequest {
            connection_id: connection_id.to_string(),
            prompt,
        });
    }

    /// Emit the terminal event of a run.
    pub fn emit_exec_end(&self, connection_id: &str, status: i32) {
        self.emit(BridgeEvent::ExecEnd {
            connection_id: connection_id.to_string(),
            status,
        });
    }
}
