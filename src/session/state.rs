//! Session State
//!
//! Tracks the live association between one client connection and one child
//! process run. At most one session exists per connection id; the registry
//! in `manager` enforces that invariant.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::process::ChildStdin;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Process handle exists but the output pump has not started yet.
    Starting,
    /// Output pump is running; the child may still produce events.
    Running,
    /// Process exited, was killed, or was replaced. The process handle is
    /// never touched again after this point.
    Ended,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// One connection's live process run.
///
/// The child process itself is owned by the session's pump task; the
/// session holds the stdin pipe for the input relay and a one-shot kill
/// switch that asks the pump to terminate the child.
#[derive(Debug)]
pub struct Session {
    /// Connection this session belongs to.
    pub connection_id: String,
    /// Unique id for this run; successive runs on one connection get fresh
    /// ids so a stale pump can detect it no longer owns the registry entry.
    pub run_id: Uuid,
    /// Current status.
    pub status: SessionStatus,
    /// OS process id, if known.
    pub pid: Option<u32>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Writable stdin of the child, shared with the input relay.
    stdin: Arc<tokio::sync::Mutex<ChildStdin>>,
    /// Kill switch consumed on first use; the pump owns the receiving end.
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    /// Output pump task handle, taken when the session is torn down.
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session in the `Starting` state.
    pub fn new(
        connection_id: impl Into<String>,
        run_id: Uuid,
        pid: Option<u32>,
        stdin: ChildStdin,
        kill_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            run_id,
            status: SessionStatus::Starting,
            pid,
            created_at: Utc::now(),
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            kill_tx: Mutex::new(Some(kill_tx)),
            pump: Mutex::new(None),
        }
    }

    /// Mark the pump as launched.
    pub fn set_running(&mut self) {
        self.status = SessionStatus::Running;
    }

    /// Mark the run as over. The process handle must not be used afterward.
    pub fn set_ended(&mut self) {
        self.status = SessionStatus::Ended;
    }

    /// Whether the run has already ended.
    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    /// Shared handle to the child's stdin for the input relay.
    pub(crate) fn stdin_handle(&self) -> Arc<tokio::sync::Mutex<ChildStdin>> {
        Arc::clone(&self.stdin)
    }

    /// Record the pump task handle.
    pub(crate) fn set_pump(&self, handle: JoinHandle<()>) {
        *self.pump.lock() = Some(handle);
    }

    /// Take the pump task handle, if still present.
    pub(crate) fn take_pump(&self) -> Option<JoinHandle<()>> {
        self.pump.lock().take()
    }

    /// Fire the kill switch. Best-effort and non-blocking: termination
    /// failure is ignored, and repeated calls are no-ops.
    pub fn kill(&self) {
        if let Some(tx) = self.kill_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Serializable session snapshot for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub connection_id: String,
    pub run_id: Uuid,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub created_at: String,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            connection_id: session.connection_id.clone(),
            run_id: session.run_id,
            status: session.status,
            pid: session.pid,
            created_at: session.created_at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Running).unwrap(),
            "\"running\""
        );
        let status: SessionStatus = serde_json::from_str("\"ended\"").unwrap();
        assert_eq!(status, SessionStatus::Ended);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Starting.to_string(), "starting");
        assert_eq!(SessionStatus::Running.to_string(), "running");
        assert_eq!(SessionStatus::Ended.to_string(), "ended");
    }
}
