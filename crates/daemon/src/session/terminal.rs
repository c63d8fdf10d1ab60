//! Line-editing state machine of a single terminal session.
//!
//! The browser sends raw keystrokes; the session echoes them, keeps the
//! pending command line, and hands completed lines to the executor. Every
//! call returns the output chunks to send back, in order.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use protocol::TerminalSize;

use super::SessionId;
use crate::executor::CommandExecutor;

/// Default prompt printed after every completed line.
pub const PROMPT: &str = "$ ";

/// Echo for a submitted line.
pub const NEWLINE_ECHO: &str = "\r\n";

/// Echo for an erased character: back, overwrite with space, back.
pub const ERASE_ECHO: &str = "\x08 \x08";

/// Echo for an interrupt.
pub const INTERRUPT_ECHO: &str = "^C\r\n";

const SUBMIT: char = '\r';
const DELETE: char = '\x7f';
const BACKSPACE: char = '\x08';
const INTERRUPT: char = '\x03';
const ESCAPE: char = '\x1b';

/// Oldest commands are dropped from a session's log past this length.
const MAX_LOGGED_COMMANDS: usize = 200;

/// Whether a command line is being typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// Buffer is empty.
    Idle,
    /// At least one character is pending.
    Accumulating,
}

/// Who opened the session and for which target. Immutable after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    /// Host or IP the terminal is nominally connected to.
    pub target: Option<String>,
    /// System user requested by the client.
    pub role: Option<String>,
    /// Remote address of the connection that created the session.
    pub peer_addr: Option<SocketAddr>,
}

/// Commands submitted in a session, readable without the session lock.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    fn push(&self, command: &str) {
        let mut commands = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if commands.len() >= MAX_LOGGED_COMMANDS {
            commands.remove(0);
        }
        commands.push(command.to_string());
    }

    /// Copy of the submitted commands, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// One terminal session's mutable state.
pub struct TerminalSession {
    id: SessionId,
    size: TerminalSize,
    input: String,
    prompt: String,
    executor: Arc<dyn CommandExecutor>,
    commands: CommandLog,
}

impl TerminalSession {
    /// Creates an idle session.
    pub fn new(
        id: SessionId,
        size: TerminalSize,
        prompt: impl Into<String>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            id,
            size,
            input: String::new(),
            prompt: prompt.into(),
            executor,
            commands: CommandLog::default(),
        }
    }

    /// Feeds one input payload and returns the output chunks it produces.
    ///
    /// The payload is processed one character at a time. An ESC starts a
    /// terminal escape sequence; it and the rest of the payload are dropped.
    pub async fn handle_input(&mut self, data: &str) -> Vec<String> {
        let mut output = Vec::new();

        for ch in data.chars() {
            if ch == ESCAPE {
                tracing::trace!(session_id = %self.id, "Ignoring escape sequence");
                break;
            }
            self.handle_char(ch, &mut output).await;
        }

        output
    }

    async fn handle_char(&mut self, ch: char, output: &mut Vec<String>) {
        match ch {
            SUBMIT => {
                output.push(NEWLINE_ECHO.to_string());

                let command = self.input.trim().to_string();
                self.input.clear();

                if !command.is_empty() {
                    self.commands.push(&command);
                    tracing::debug!(
                        session_id = %self.id,
                        executor = self.executor.name(),
                        command = %command,
                        "Executing command"
                    );
                    match self.executor.execute(&command).await {
                        Ok(text) if text.is_empty() => {}
                        Ok(text) => output.push(text),
                        Err(e) => {
                            tracing::warn!(session_id = %self.id, error = %e, "Command failed");
                            output.push(format!("\x1b[31m{}\x1b[0m\r\n", e));
                        }
                    }
                }

                output.push(self.prompt.clone());
            }
            DELETE | BACKSPACE => {
                if self.input.pop().is_some() {
                    output.push(ERASE_ECHO.to_string());
                }
            }
            INTERRUPT => {
                self.input.clear();
                output.push(INTERRUPT_ECHO.to_string());
                output.push(self.prompt.clone());
            }
            c if c.is_control() => {}
            c => {
                self.input.push(c);
                output.push(c.to_string());
            }
        }
    }

    /// Updates the viewport and notifies the executor. Produces no output.
    pub fn resize(&mut self, size: TerminalSize) {
        self.size = size;
        self.executor.resize(&self.id, size);
        tracing::debug!(
            session_id = %self.id,
            cols = size.cols,
            rows = size.rows,
            "Session resized"
        );
    }

    /// Discards any pending input.
    pub fn kill(&mut self) {
        self.input.clear();
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current input state.
    pub fn state(&self) -> InputState {
        if self.input.is_empty() {
            InputState::Idle
        } else {
            InputState::Accumulating
        }
    }

    /// Pending command line.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Current viewport.
    pub fn size(&self) -> TerminalSize {
        self.size
    }

    /// Prompt printed after each line.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Shared handle to the submitted-command log.
    pub fn command_log(&self) -> CommandLog {
        self.commands.clone()
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("input", &self.input)
            .field("executor", &self.executor.name())
            .finish()
    }
}
