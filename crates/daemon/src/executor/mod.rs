//! Command executors.
//!
//! A terminal session hands every submitted line to a [`CommandExecutor`]
//! and renders whatever text comes back. The daemon ships two executors:
//! a canned demo table and a shell executor that runs commands through
//! `sh -c` with a timeout.

pub mod canned;
pub mod shell;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use protocol::TerminalSize;
use thiserror::Error;

use crate::config::{ExecutorConfig, ExecutorKind};

pub use canned::CannedExecutor;
pub use shell::ShellExecutor;

/// Errors an executor can report for a single command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The command process could not be started.
    #[error("failed to start command: {0}")]
    Spawn(String),

    /// The command did not finish in time.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The command ran but the executor could not produce output.
    #[error("command failed: {0}")]
    Failed(String),
}

/// Turns a submitted command line into output text.
///
/// Implementations are shared by every session and must be thread-safe.
/// Output uses `\r\n` line endings since it is written straight to a
/// terminal emulator.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs a trimmed, non-empty command line.
    async fn execute(&self, command: &str) -> Result<String, ExecutorError>;

    /// Notified when a session's viewport changes.
    fn resize(&self, _session_id: &str, _size: TerminalSize) {}

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Builds the executor selected by configuration.
pub fn from_config(config: &ExecutorConfig) -> Arc<dyn CommandExecutor> {
    match config.kind {
        ExecutorKind::Canned => Arc::new(CannedExecutor::new()),
        ExecutorKind::Shell => Arc::new(ShellExecutor::new(
            config.shell.clone(),
            Duration::from_secs(config.timeout_secs),
        )),
    }
}

/// Converts bare `\n` line endings to `\r\n`.
pub fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}
