//! Output Pump
//!
//! Per-session background task that drains the child's combined
//! stdout/stderr stream, classifies each complete line per the Marker
//! Protocol, and emits `stdout` / `stdin_request` events as lines arrive.
//! After the stream ends it reaps the child and emits exactly one
//! `exec_end`, guaranteed to be the last event of the run.
//!
//! The pipe read is blocking, so the drain loop runs on a dedicated
//! blocking task while the async side stays responsive to the session's
//! kill switch. The pump is the sole reader of the child's output and the
//! sole owner of the child handle.

use dashmap::DashMap;
use log::{debug, warn};
use std::io::{self, BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::events::{BridgeEventEmitter, STATUS_UNAVAILABLE};
use super::state::Session;
use crate::protocol::{classify_line, OutputLine};

/// Everything a pump needs besides the process itself.
pub(crate) struct PumpContext {
    pub sessions: Arc<DashMap<String, Session>>,
    pub emitter: BridgeEventEmitter,
    pub connection_id: String,
    pub run_id: Uuid,
    pub kill_grace: Duration,
}

/// Launch the output pump for one session.
///
/// The returned task runs until the child's output stream closes (or a read
/// fails), then reaps the process, emits the terminal `exec_end`, and
/// deregisters the session if it still owns the registry entry.
pub(crate) fn spawn_pump(
    ctx: PumpContext,
    mut child: Child,
    output: os_pipe::PipeReader,
    mut kill_rx: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let drain_emitter = ctx.emitter.clone();
        let drain_conn = ctx.connection_id.clone();
        let mut drain =
            tokio::task::spawn_blocking(move || drain_output(output, &drain_emitter, &drain_conn));

        // Drain until end-of-stream, firing the kill switch if it trips.
        // A killed child closes its pipes, so the drain loop still ends
        // through its normal end-of-stream path.
        let mut killed = false;
        let drain_result = loop {
            tokio::select! {
                res = &mut drain => break res,
                _ = &mut kill_rx, if !killed => {
                    killed = true;
                    let _ = child.start_kill();
                }
            }
        };

        let status = match drain_result {
            Ok(Ok(())) => wait_for_exit(&mut child, &mut kill_rx, &mut killed).await,
            Ok(Err(err)) => {
                warn!(
                    "Read failure on session output for {}: {}",
                    ctx.connection_id, err
                );
                ctx.emitter
                    .emit_stdout(&ctx.connection_id, format!("\n[reader error] {}\n", err));
                bounded_wait(&mut child, ctx.kill_grace).await
            }
            Err(join_err) => {
                warn!(
                    "Output drain task failed for {}: {}",
                    ctx.connection_id, join_err
                );
                ctx.emitter
                    .emit_stdout(&ctx.connection_id, format!("\n[reader error] {}\n", join_err));
                bounded_wait(&mut child, ctx.kill_grace).await
            }
        };

        // Flip the entry to Ended (if this run still owns it) before the
        // terminal event goes out, so the input relay stops touching the
        // process the moment the run is over.
        if let Some(mut entry) = ctx.sessions.get_mut(&ctx.connection_id) {
            if entry.run_id == ctx.run_id {
                entry.set_ended();
            }
        }

        ctx.emitter.emit_exec_end(&ctx.connection_id, status);

        // Deregister exactly once; a replaced run finds someone else's
        // entry here and leaves it alone.
        ctx.sessions
            .remove_if(&ctx.connection_id, |_, session| session.run_id == ctx.run_id);

        debug!(
            "Session {} run {} ended with status {}",
            ctx.connection_id, ctx.run_id, status
        );
    })
}

/// Blocking drain loop: read complete lines, classify, emit.
///
/// A final fragment without a trailing newline is dropped; that only
/// happens on abrupt termination and matches the line-oriented contract.
fn drain_output(
    reader: os_pipe::PipeReader,
    emitter: &BridgeEventEmitter,
    connection_id: &str,
) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(4096);
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || !buf.ends_with(b"\n") {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        match classify_line(&line) {
            OutputLine::Stdout(text) => emitter.emit_stdout(connection_id, text),
            OutputLine::StdinRequest(prompt) => {
                emitter.emit_stdin_request(connection_id, prompt)
            }
            OutputLine::Suppressed => {}
        }
    }
}

/// Reap the child, staying responsive to the kill switch in case the child
/// closed its output but kept running.
async fn wait_for_exit(
    child: &mut Child,
    kill_rx: &mut oneshot::Receiver<()>,
    killed: &mut bool,
) -> i32 {
    if !*killed {
        tokio::select! {
            result = child.wait() => return exit_code(result),
            _ = kill_rx => {
                *killed = true;
            }
        }
        let _ = child.start_kill();
    }
    exit_code(child.wait().await)
}

/// Short bounded wait used after a read failure; falls back to the
/// sentinel status when the child refuses to be reaped in time.
async fn bounded_wait(child: &mut Child, grace: Duration) -> i32 {
    let _ = child.start_kill();
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(result) => exit_code(result),
        Err(_) => STATUS_UNAVAILABLE,
    }
}

/// Map an OS exit status onto the wire status: the exit code when there is
/// one, `-(signal)` for signal deaths on unix, the sentinel otherwise.
fn exit_code(result: io::Result<std::process::ExitStatus>) -> i32 {
    match result {
        Ok(status) => status.code().unwrap_or_else(|| signal_status(status)),
        Err(_) => STATUS_UNAVAILABLE,
    }
}

#[cfg(unix)]
fn signal_status(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| -sig).unwrap_or(STATUS_UNAVAILABLE)
}

#[cfg(not(unix))]
fn signal_status(_status: std::process::ExitStatus) -> i32 {
    STATUS_UNAVAILABLE
}
