//! Demo driver for the process bridge.
//!
//! Speaks the bridge's wire events over the local terminal: one JSON
//! [`ClientEvent`] per stdin line in, one JSON [`BridgeEvent`] per stdout
//! line out, all on a single implicit connection. Useful for poking at the
//! bridge by hand; real servers wire [`SessionManager`] to their own
//! transport instead.

use log::{error, warn};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;

use photon_bridge::{BridgeConfig, ClientEvent, SessionManager};

const CONNECTION_ID: &str = "local";

#[tokio::main]
async fn main() {
    env_logger::init();

    let manager = Arc::new(SessionManager::with_config(BridgeConfig::from_env()));

    let mut events = manager.subscribe();
    let writer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{}", json),
                    Err(err) => error!("Failed to serialize event: {}", err),
                },
                Err(RecvError::Lagged(missed)) => {
                    warn!("Dropped {} events (slow terminal)", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientEvent>(&line) {
                    Ok(event) => manager.handle_client_event(CONNECTION_ID, event).await,
                    Err(err) => warn!("Ignoring malformed client event: {}", err),
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!("Failed to read stdin: {}", err);
                break;
            }
        }
    }

    manager.disconnect(CONNECTION_ID);
    manager.shutdown_all().await;
    writer.abort();
}
