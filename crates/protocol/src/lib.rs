//! # WebShell Protocol Library
//!
//! This crate defines the wire protocol spoken between a browser terminal
//! and the WebShell daemon over a WebSocket.
//!
//! ## Overview
//!
//! - **Frame Definitions**: client frames (resize, input, heartbeat, open,
//!   attach, close) and server frames (init, output, pong, closed)
//! - **Frame Codec**: JSON encode/decode with lenient tag parsing
//! - **Handshake**: query-string parameters accepted at connection open
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ClientFrame, FrameCodec, ServerFrame};
//!
//! let codec = FrameCodec::new();
//!
//! let frame = codec.decode(r#"{"type":2,"msg":"l"}"#).unwrap();
//! assert!(matches!(frame, ClientFrame::Input { .. }));
//!
//! let text = codec.encode(&ServerFrame::output("t-1", "$ ")).unwrap();
//! assert!(text.contains("\"type\":\"output\""));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Frame definitions
//! - [`framing`]: JSON frame codec
//! - [`handshake`]: Connection query parameters
//! - [`error`]: Error types

pub mod error;
pub mod framing;
pub mod handshake;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{FrameCodec, MAX_FRAME_SIZE};
pub use handshake::HandshakeParams;
pub use messages::{
    ClientFrame, ServerFrame, TerminalId, TerminalSize, TYPE_HEARTBEAT, TYPE_INPUT, TYPE_RESIZE,
};
