//! Process-backed command runner

use crate::transport::traits::CommandRunner;
use async_trait::async_trait;
use fleet_shared::TransportError;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exited with status zero
    pub exit_success: bool,
    /// Exit code, absent when killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// The command did not finish within its timeout
    pub timed_out: bool,
}

impl CommandOutput {
    /// Output of a command that exited with `code`
    #[cfg(test)]
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_success: code == 0,
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Output of a command that was stopped after `limit`
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            exit_success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: format!("command timed out after {}s", limit.as_secs_f64()),
            timed_out: true,
        }
    }

    fn from_process(output: std::process::Output) -> Self {
        Self {
            exit_success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        }
    }
}

/// Runs commands as child processes. The child is killed if it outlives its timeout.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        limit: Duration,
    ) -> Result<CommandOutput, TransportError> {
        debug!("Running {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(program, e))?;

        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput::from_process(output)),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            // Dropping the wait future drops the child, which kills it
            Err(_) => Ok(CommandOutput::timed_out(limit)),
        }
    }
}

fn spawn_error(program: &str, err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::NotFound => TransportError::environment(program, "executable not found"),
        io::ErrorKind::PermissionDenied => {
            TransportError::environment(program, "permission denied")
        }
        _ => TransportError::environment(program, err.to_string()),
    }
}
