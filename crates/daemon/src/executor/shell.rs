//! Executor that runs each command line through a real shell.
//!
//! Each submitted line is a fresh `<shell> -c <line>` process with stdin
//! closed. Stdout and stderr are concatenated; a non-zero exit status is
//! not an error, the shell's own message is the output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{to_crlf, CommandExecutor, ExecutorError};

/// Runs commands via `<shell> -c`, killing them after a timeout.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Duration,
}

impl ShellExecutor {
    /// Creates a shell executor.
    pub fn new(shell: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<String, ExecutorError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ExecutorError::Timeout(self.timeout))?
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        tracing::debug!(
            command = command,
            status = ?output.status.code(),
            bytes = text.len(),
            "Shell command finished"
        );

        let mut text = to_crlf(&text);
        if !text.is_empty() && !text.ends_with("\r\n") {
            text.push_str("\r\n");
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "shell"
    }
}
