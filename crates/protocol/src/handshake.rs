//! Connection handshake parameters.
//!
//! Browsers cannot attach custom headers to a WebSocket upgrade, so the
//! handshake travels in the query string:
//! `/ws?ip=10.0.0.5&role=admin&rows=24&cols=80[&terminalId=...]`.

use serde::Deserialize;

use crate::messages::{TerminalId, TerminalSize};

/// Query parameters accepted when a connection opens.
///
/// Every field is optional and kept as text; parsing is lenient so that a
/// sloppy client still gets a terminal with default dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HandshakeParams {
    /// Target host or IP the terminal is for.
    pub ip: Option<String>,
    /// Role or system user requested by the client.
    #[serde(alias = "sys_user")]
    pub role: Option<String>,
    /// Initial rows.
    pub rows: Option<String>,
    /// Initial columns.
    pub cols: Option<String>,
    /// Existing session to reattach instead of creating a new one.
    #[serde(rename = "terminalId")]
    pub terminal_id: Option<TerminalId>,
}

impl HandshakeParams {
    /// Resolve the requested size, falling back per dimension to `default`.
    ///
    /// Zero, negative or non-numeric values are treated as absent.
    pub fn size(&self, default: TerminalSize) -> TerminalSize {
        TerminalSize {
            cols: parse_dimension(self.cols.as_deref()).unwrap_or(default.cols),
            rows: parse_dimension(self.rows.as_deref()).unwrap_or(default.rows),
        }
    }

    /// Returns the requested reattachment id, ignoring empty strings.
    pub fn reattach_id(&self) -> Option<&str> {
        self.terminal_id.as_deref().filter(|id| !id.is_empty())
    }
}

fn parse_dimension(value: Option<&str>) -> Option<u16> {
    value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|v| *v > 0)
}
