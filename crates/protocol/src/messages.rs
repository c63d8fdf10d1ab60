//! Frame definitions for the WebShell terminal protocol.
//!
//! Every WebSocket text message carries exactly one JSON object tagged by a
//! `type` field. Client frames use the numeric tags `1` (resize), `2` (input)
//! and `3` (heartbeat) plus the named lifecycle tags `open`, `attach` and
//! `close`. Server frames are always tagged by name.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Unique identifier of a terminal session on the wire.
pub type TerminalId = String;

/// Numeric tag of a resize frame.
pub const TYPE_RESIZE: u64 = 1;

/// Numeric tag of an input frame.
pub const TYPE_INPUT: u64 = 2;

/// Numeric tag of a heartbeat frame.
pub const TYPE_HEARTBEAT: u64 = 3;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of columns.
    pub cols: u16,
    /// Number of rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new terminal size.
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// Frames sent from the browser to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Viewport resize (`type: 1`).
    Resize {
        /// Addressed session, or the connection's primary session when absent.
        terminal_id: Option<TerminalId>,
        /// New dimensions.
        size: TerminalSize,
    },
    /// Keyboard input (`type: 2`).
    Input {
        /// Addressed session, or the connection's primary session when absent.
        terminal_id: Option<TerminalId>,
        /// Raw input text, usually a single character.
        data: String,
    },
    /// Liveness signal (`type: 3`).
    Heartbeat {
        /// Addressed session, or the connection's primary session when absent.
        terminal_id: Option<TerminalId>,
    },
    /// Open an additional session on this connection.
    Open {
        /// Requested dimensions; server defaults apply when absent.
        size: Option<TerminalSize>,
    },
    /// Attach an existing session to this connection.
    Attach {
        /// Session to attach.
        terminal_id: TerminalId,
    },
    /// Destroy a session.
    Close {
        /// Session to close.
        terminal_id: TerminalId,
    },
}

impl ClientFrame {
    /// Returns the session id this frame explicitly addresses, if any.
    pub fn terminal_id(&self) -> Option<&str> {
        match self {
            ClientFrame::Resize { terminal_id, .. }
            | ClientFrame::Input { terminal_id, .. }
            | ClientFrame::Heartbeat { terminal_id } => terminal_id.as_deref(),
            ClientFrame::Attach { terminal_id } | ClientFrame::Close { terminal_id } => {
                Some(terminal_id)
            }
            ClientFrame::Open { .. } => None,
        }
    }

    /// Short name of the frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Resize { .. } => "resize",
            ClientFrame::Input { .. } => "input",
            ClientFrame::Heartbeat { .. } => "heartbeat",
            ClientFrame::Open { .. } => "open",
            ClientFrame::Attach { .. } => "attach",
            ClientFrame::Close { .. } => "close",
        }
    }

    /// Build the JSON object a browser client would send for this frame.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = match self {
            ClientFrame::Resize { size, .. } => json!({
                "type": TYPE_RESIZE,
                "cols": size.cols,
                "rows": size.rows,
            }),
            ClientFrame::Input { data, .. } => json!({ "type": TYPE_INPUT, "msg": data }),
            ClientFrame::Heartbeat { .. } => json!({ "type": TYPE_HEARTBEAT }),
            ClientFrame::Open { size } => match size {
                Some(size) => json!({ "type": "open", "cols": size.cols, "rows": size.rows }),
                None => json!({ "type": "open" }),
            },
            ClientFrame::Attach { .. } => json!({ "type": "attach" }),
            ClientFrame::Close { .. } => json!({ "type": "close" }),
        };

        if let (Some(id), Some(object)) = (self.terminal_id(), value.as_object_mut()) {
            object.insert("terminalId".to_string(), json!(id));
        }

        value
    }
}

/// Frames sent from the server to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// A session was created or attached for this connection.
    Init {
        /// The session id to use for subsequent frames.
        #[serde(rename = "terminalId")]
        terminal_id: TerminalId,
        /// Current columns.
        cols: u16,
        /// Current rows.
        rows: u16,
    },
    /// Terminal output to render.
    Output {
        /// The session that produced the output.
        #[serde(rename = "terminalId")]
        terminal_id: TerminalId,
        /// Output text, possibly containing escape sequences.
        content: String,
    },
    /// Heartbeat acknowledgement.
    Pong {
        /// The session the heartbeat addressed.
        #[serde(rename = "terminalId")]
        terminal_id: TerminalId,
    },
    /// A session was destroyed.
    Closed {
        /// The destroyed session.
        #[serde(rename = "terminalId")]
        terminal_id: TerminalId,
        /// Human-readable reason.
        reason: String,
    },
}

impl ServerFrame {
    /// Build an output frame.
    pub fn output(terminal_id: impl Into<TerminalId>, content: impl Into<String>) -> Self {
        ServerFrame::Output {
            terminal_id: terminal_id.into(),
            content: content.into(),
        }
    }

    /// Returns the session this frame belongs to.
    pub fn terminal_id(&self) -> &str {
        match self {
            ServerFrame::Init { terminal_id, .. }
            | ServerFrame::Output { terminal_id, .. }
            | ServerFrame::Pong { terminal_id }
            | ServerFrame::Closed { terminal_id, .. } => terminal_id,
        }
    }
}
