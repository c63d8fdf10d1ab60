//! Session management module.
//!
//! This module owns terminal session lifetime: the per-session input state
//! machine, the shared registry every connection routes through, the idle
//! reaper that evicts abandoned sessions, and the history of destroyed ones.

pub mod history;
pub mod reaper;
pub mod registry;
pub mod terminal;
pub mod transport;

use std::time::{SystemTime, UNIX_EPOCH};

pub use history::{HistoryPage, HistoryQuery, HistoryRecord, SessionHistory};
pub use reaper::IdleReaper;
pub use registry::{RegistrySettings, SessionError, SessionHandle, SessionInfo, SessionRegistry};
pub use terminal::{CommandLog, InputState, SessionMetadata, TerminalSession};
pub use transport::{ConnectionEvent, ConnectionId, TransportHandle};

/// Server-generated session identifier (UUIDv4 string).
pub type SessionId = String;

/// Returns the current Unix timestamp in milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
