//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all frame encode/decode failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame could not be parsed as a JSON object.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame carried a `type` tag this protocol does not know.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(String),

    /// Frame is missing a field its type requires.
    #[error("frame type {frame_type} is missing field `{field}`")]
    MissingField {
        /// The frame type being decoded.
        frame_type: &'static str,
        /// The missing field name.
        field: &'static str,
    },

    /// Frame exceeds maximum allowed size.
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Failed to serialize an outbound frame.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::MalformedFrame(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}
