//! # WebShell Daemon Library
//!
//! This crate provides the server side of WebShell: browser terminals that
//! talk to the daemon over a WebSocket.
//!
//! ## Overview
//!
//! - **Session Registry**: concurrent map of live terminal sessions
//! - **Terminal Sessions**: line editing, echo and command dispatch
//! - **Connection Handling**: handshake, frame routing and multiplexing
//! - **Idle Reaper**: evicts sessions nobody has touched for a while
//! - **Command Executors**: canned demo output or a real shell
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Daemon Orchestrator                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  axum server (/ws, /healthz, /api/*)       Idle Reaper       │
//! │        │                                        │            │
//! │  ConnectionHandler (one per socket)             │            │
//! │        │                                        │            │
//! │  ┌─────▼────────────────────────────────────────▼─────────┐  │
//! │  │                  Session Registry                      │  │
//! │  └─────┬──────────────────────────────────────────────────┘  │
//! │        │                                                     │
//! │  TerminalSession ──▶ CommandExecutor (canned | shell)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, DaemonOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let mut orchestrator = DaemonOrchestrator::new(config)?;
//!     let addr = orchestrator.start().await?;
//!     println!("listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Registry, terminal state machine and reaper
//! - [`executor`]: Command executors
//! - [`connection`]: Per-connection frame routing
//! - [`server`]: HTTP and WebSocket routes
//! - [`metadata`]: Listing endpoints for the connection form
//! - [`logging`]: Tracing subscriber setup
//! - [`orchestrator`]: Main daemon coordinator

pub mod config;
pub mod connection;
pub mod executor;
pub mod logging;
pub mod metadata;
pub mod orchestrator;
pub mod server;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use config::{Config, ConfigError, DisconnectPolicy, ExecutorKind};
pub use connection::{ConnectionError, ConnectionHandler, ConnectionSettings};
pub use executor::{CannedExecutor, CommandExecutor, ExecutorError, ShellExecutor};
pub use metadata::{MetadataKind, MetadataService, StaticMetadata};
pub use orchestrator::{DaemonOrchestrator, OrchestratorEvent, OrchestratorState};
pub use session::{
    HistoryPage, HistoryQuery, HistoryRecord, IdleReaper, SessionError, SessionHandle,
    SessionHistory, SessionId, SessionInfo, SessionMetadata, SessionRegistry, TerminalSession,
};
