//! Handle a session keeps on the connection it is attached to.

use tokio::sync::mpsc;

use super::SessionId;

/// Unique identifier of one WebSocket connection.
pub type ConnectionId = String;

/// Notifications delivered to a connection worker from outside its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The session was destroyed or taken over; stop routing frames to it.
    SessionClosed {
        session_id: SessionId,
        reason: String,
    },
}

/// A session's link back to its attached connection.
///
/// Cloning is cheap. Sending on a handle whose connection has already gone
/// away is silently ignored.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    connection_id: ConnectionId,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl TransportHandle {
    /// Creates a handle for the given connection.
    pub fn new(
        connection_id: impl Into<ConnectionId>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            events,
        }
    }

    /// The connection this handle points at.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Tells the connection to drop `session_id`.
    pub fn close(&self, session_id: &str, reason: &str) {
        let event = ConnectionEvent::SessionClosed {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        };
        if self.events.send(event).is_err() {
            tracing::trace!(
                connection_id = %self.connection_id,
                session_id = %session_id,
                "Connection already gone, close notification dropped"
            );
        }
    }

    /// Returns true once the owning connection worker has exited.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}
