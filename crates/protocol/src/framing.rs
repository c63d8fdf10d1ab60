//! JSON frame codec.
//!
//! # Frame Format
//!
//! One JSON object per WebSocket text message. The `type` field selects the
//! frame kind and may be a number (`1`, `2`, `3`), a numeric string (`"2"`)
//! or a lifecycle name (`"open"`, `"attach"`, `"close"`). Unknown fields are
//! ignored; unknown types are rejected with [`ProtocolError::UnknownFrameType`].

use serde::Deserialize;

use crate::error::{ProtocolError, Result};
use crate::messages::{
    ClientFrame, ServerFrame, TerminalSize, TYPE_HEARTBEAT, TYPE_INPUT, TYPE_RESIZE,
};

/// Maximum accepted inbound frame size (64 KB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// The `type` tag as it appears on the wire.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FrameTag {
    Code(u64),
    Name(String),
}

/// Resolved frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Resize,
    Input,
    Heartbeat,
    Open,
    Attach,
    Close,
}

impl FrameTag {
    fn resolve(&self) -> Result<FrameKind> {
        let code = match self {
            FrameTag::Code(code) => *code,
            FrameTag::Name(name) => match name.as_str() {
                "open" => return Ok(FrameKind::Open),
                "attach" => return Ok(FrameKind::Attach),
                "close" => return Ok(FrameKind::Close),
                other => other
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ProtocolError::UnknownFrameType(other.to_string()))?,
            },
        };

        match code {
            TYPE_RESIZE => Ok(FrameKind::Resize),
            TYPE_INPUT => Ok(FrameKind::Input),
            TYPE_HEARTBEAT => Ok(FrameKind::Heartbeat),
            other => Err(ProtocolError::UnknownFrameType(other.to_string())),
        }
    }
}

/// Loose wire shape of every client frame.
#[derive(Debug, Deserialize)]
struct RawClientFrame {
    #[serde(rename = "type")]
    tag: FrameTag,
    cols: Option<u16>,
    rows: Option<u16>,
    #[serde(alias = "content")]
    msg: Option<String>,
    #[serde(rename = "terminalId")]
    terminal_id: Option<String>,
}

impl RawClientFrame {
    fn into_frame(self) -> Result<ClientFrame> {
        let kind = self.tag.resolve()?;
        let terminal_id = self.terminal_id.filter(|id| !id.is_empty());

        match kind {
            FrameKind::Resize => {
                let cols = self.cols.ok_or(ProtocolError::MissingField {
                    frame_type: "resize",
                    field: "cols",
                })?;
                let rows = self.rows.ok_or(ProtocolError::MissingField {
                    frame_type: "resize",
                    field: "rows",
                })?;
                Ok(ClientFrame::Resize {
                    terminal_id,
                    size: TerminalSize::new(cols, rows),
                })
            }
            FrameKind::Input => {
                let data = self.msg.ok_or(ProtocolError::MissingField {
                    frame_type: "input",
                    field: "msg",
                })?;
                Ok(ClientFrame::Input { terminal_id, data })
            }
            FrameKind::Heartbeat => Ok(ClientFrame::Heartbeat { terminal_id }),
            FrameKind::Open => {
                let size = match (self.cols, self.rows) {
                    (Some(cols), Some(rows)) => Some(TerminalSize::new(cols, rows)),
                    _ => None,
                };
                Ok(ClientFrame::Open { size })
            }
            FrameKind::Attach => Ok(ClientFrame::Attach {
                terminal_id: terminal_id.ok_or(ProtocolError::MissingField {
                    frame_type: "attach",
                    field: "terminalId",
                })?,
            }),
            FrameKind::Close => Ok(ClientFrame::Close {
                terminal_id: terminal_id.ok_or(ProtocolError::MissingField {
                    frame_type: "close",
                    field: "terminalId",
                })?,
            }),
        }
    }
}

/// Encoder and decoder for protocol frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Largest inbound frame accepted, in bytes.
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a codec with the default size limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom inbound size limit.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Decode a client frame from a text message.
    pub fn decode(&self, text: &str) -> Result<ClientFrame> {
        if text.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: text.len(),
                max: self.max_frame_size,
            });
        }

        let raw: RawClientFrame = serde_json::from_str(text)?;
        raw.into_frame()
    }

    /// Encode a server frame into a text message.
    pub fn encode(&self, frame: &ServerFrame) -> Result<String> {
        serde_json::to_string(frame).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode a server frame. Used by clients and tests.
    pub fn decode_server(&self, text: &str) -> Result<ServerFrame> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode a client frame. Used by clients and tests.
    pub fn encode_client(&self, frame: &ClientFrame) -> String {
        frame.to_json().to_string()
    }
}
