//! photon-bridge
//!
//! Bridges a remote client to a freshly spawned, short-lived interpreter
//! process: the client submits a program, receives its output line by line,
//! and answers the interactive input prompts the program raises — all over
//! whatever bidirectional message transport the embedding server provides.
//!
//! The transport itself is out of scope. A server wires one
//! [`SessionManager`] to its connection layer: inbound [`ClientEvent`]s go
//! to [`SessionManager::handle_client_event`], outbound [`BridgeEvent`]s
//! come from [`SessionManager::subscribe`], tagged with the connection id
//! they belong to.

pub mod config;
pub mod launcher;
pub mod protocol;
pub mod session;

pub use config::BridgeConfig;
pub use session::{
    BridgeError, BridgeEvent, ClientEvent, SessionInfo, SessionManager, SessionStatus,
};
