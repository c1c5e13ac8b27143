//! Session Management Module
//!
//! The per-connection state machine at the heart of the bridge:
//! - Lock-free concurrent session registry (DashMap)
//! - One output pump task per session, sole reader of the child's output
//! - Kill-switch teardown on disconnect and run replacement
//! - Connection-tagged events so transports can discard stale ones

pub mod events;
pub mod manager;
pub mod pump;
pub mod state;

pub use events::{BridgeEvent, BridgeEventEmitter, ClientEvent, STATUS_UNAVAILABLE};
pub use manager::{BridgeError, SessionManager};
pub use state::{Session, SessionInfo, SessionStatus};
