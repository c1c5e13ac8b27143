//! Session Registry & Lifecycle Manager
//!
//! Owns the connection-id → session map, enforces at-most-one live process
//! per connection, relays client input into the running child, and drives
//! teardown on disconnect or replacement.
//!
//! All registry mutations go through DashMap entry-level locking, so two
//! `exec_start` events racing on one connection can never leave two live
//! untracked processes: whichever insert loses finds the other session in
//! the map and kills the one it displaced.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use super::events::{BridgeEvent, BridgeEventEmitter, ClientEvent, STATUS_UNAVAILABLE};
use super::pump::{spawn_pump, PumpContext};
use super::state::{Session, SessionInfo};
use crate::config::BridgeConfig;
use crate::launcher::{self, LaunchedProcess};

/// How long `shutdown_all` waits for each pump to finish.
const SHUTDOWN_PUMP_TIMEOUT: Duration = Duration::from_secs(5);

/// The process bridge: one instance serves every connection.
pub struct SessionManager {
    /// Active sessions (connection_id -> Session)
    sessions: Arc<DashMap<String, Session>>,
    /// Outbound event broadcaster
    events: broadcast::Sender<BridgeEvent>,
    /// Bridge configuration
    config: BridgeConfig,
}

impl SessionManager {
    /// Create a manager with default configuration.
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    /// Create a manager with explicit configuration.
    pub fn with_config(config: BridgeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            sessions: Arc::new(DashMap::new()),
            events,
            config,
        }
    }

    /// Subscribe to outbound bridge events.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    fn emitter(&self) -> BridgeEventEmitter {
        BridgeEventEmitter::new(self.events.clone())
    }

    /// Begin a new run for a connection, replacing any prior run.
    ///
    /// The previous process (if any) gets a best-effort kill and its
    /// session is discarded before the new one is registered. On spawn
    /// failure no session is registered; an `exec_end` with the sentinel
    /// status is emitted so the client stops waiting, and the error is
    /// also returned to the embedding server.
    pub fn exec_start(&self, connection_id: &str, code: &str) -> Result<(), BridgeError> {
        if let Some((_, old)) = self.sessions.remove(connection_id) {
            debug!(
                "Replacing run {} on connection {}",
                old.run_id, connection_id
            );
            old.kill();
        }

        let launched = match launcher::spawn_interpreter(&self.config, code) {
            Ok(launched) => launched,
            Err(err) => {
                error!(
                    "Failed to spawn interpreter for connection {}: {}",
                    connection_id, err
                );
                self.emitter()
                    .emit_exec_end(connection_id, STATUS_UNAVAILABLE);
                return Err(BridgeError::Spawn(err));
            }
        };

        let LaunchedProcess {
            child,
            stdin,
            output,
            pid,
        } = launched;

        let run_id = Uuid::new_v4();
        let (kill_tx, kill_rx) = oneshot::channel();
        let session = Session::new(connection_id, run_id, pid, stdin, kill_tx);

        if let Some(displaced) = self.sessions.insert(connection_id.to_string(), session) {
            // A racing exec_start slipped in between the removal above and
            // this insert; its process is tracked by the entry we just
            // displaced, so kill it here.
            debug!(
                "Displaced racing run {} on connection {}",
                displaced.run_id, connection_id
            );
            displaced.kill();
        }

        let ctx = PumpContext {
            sessions: Arc::clone(&self.sessions),
            emitter: self.emitter(),
            connection_id: connection_id.to_string(),
            run_id,
            kill_grace: self.config.kill_grace,
        };
        let pump = spawn_pump(ctx, child, output, kill_rx);

        // The pump may already have deregistered a short-lived run; only
        // the entry still owned by this run gets updated.
        if let Some(mut entry) = self.sessions.get_mut(connection_id) {
            if entry.run_id == run_id {
                entry.set_running();
                entry.set_pump(pump);
            }
        }

        info!(
            "Started run {} (pid {:?}) for connection {}",
            run_id, pid, connection_id
        );
        Ok(())
    }

    /// Relay client-supplied text into the running child's stdin.
    ///
    /// Input arriving for a connection with no live run is silently
    /// dropped; that is the normal outcome of racing a process exit, not
    /// an error. A failed write surfaces as a diagnostic `stdout` line and
    /// the session keeps running.
    pub async fn stdin(&self, connection_id: &str, text: &str) {
        let stdin = match self.sessions.get(connection_id) {
            Some(session) if !session.is_ended() => session.stdin_handle(),
            _ => {
                debug!(
                    "Dropping stdin for connection {}: no live session",
                    connection_id
                );
                return;
            }
        };

        let mut guard = stdin.lock().await;
        let result = match guard.write_all(text.as_bytes()).await {
            Ok(()) => guard.flush().await,
            Err(err) => Err(err),
        };
        drop(guard);

        if let Err(err) = result {
            warn!(
                "Failed to write stdin for connection {}: {}",
                connection_id, err
            );
            // A broken pipe racing the run's end gets no diagnostic;
            // exec_end stays the last event of the run.
            let still_live = self
                .sessions
                .get(connection_id)
                .map_or(false, |session| !session.is_ended());
            if still_live {
                self.emitter()
                    .emit_stdout(connection_id, format!("\n[stdin error] {}\n", err));
            }
        }
    }

    /// Tear down any session for a connection. Idempotent.
    pub fn disconnect(&self, connection_id: &str) {
        if let Some((_, session)) = self.sessions.remove(connection_id) {
            info!(
                "Disconnect: terminating run {} on connection {}",
                session.run_id, connection_id
            );
            session.kill();
        }
    }

    /// Dispatch one inbound transport event to the matching entry point.
    pub async fn handle_client_event(&self, connection_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::ExecStart { code } => {
                // Spawn failures were already reported outward as exec_end.
                let _ = self.exec_start(connection_id, &code);
            }
            ClientEvent::Stdin { text } => self.stdin(connection_id, &text).await,
            ClientEvent::Disconnect => self.disconnect(connection_id),
        }
    }

    /// Snapshot of one connection's session, if any.
    pub fn session_info(&self, connection_id: &str) -> Option<SessionInfo> {
        self.sessions
            .get(connection_id)
            .map(|session| SessionInfo::from(session.value()))
    }

    /// Snapshots of all registered sessions.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|session| SessionInfo::from(session.value()))
            .collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Tear down every session and wait (bounded) for their pumps to
    /// finish, so each run still gets its terminal `exec_end`.
    pub async fn shutdown_all(&self) {
        info!("Shutting down all sessions...");

        let connection_ids: Vec<String> =
            self.sessions.iter().map(|s| s.key().clone()).collect();

        let mut pumps = Vec::new();
        for connection_id in connection_ids {
            if let Some((_, session)) = self.sessions.remove(&connection_id) {
                session.kill();
                if let Some(handle) = session.take_pump() {
                    pumps.push(handle);
                }
            }
        }

        for pump in pumps {
            let _ = tokio::time::timeout(SHUTDOWN_PUMP_TIMEOUT, pump).await;
        }

        info!("All sessions shut down");
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge errors surfaced to the embedding server.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to spawn interpreter process: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<BridgeError> for String {
    fn from(err: BridgeError) -> String {
        err.to_string()
    }
}
