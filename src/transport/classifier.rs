//! Outcome classification for bridge commands
//!
//! A zero exit status alone is not trusted: the bridge exits zero on several
//! silent no-ops, so success also requires an affirmative marker in stdout.

use crate::config::TransportConfig;
use crate::transport::runner::CommandOutput;
use std::fmt;

/// Bridge operation a command output belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Install,
    Disconnect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Connect => write!(f, "connect"),
            Operation::Install => write!(f, "install"),
            Operation::Disconnect => write!(f, "disconnect"),
        }
    }
}

/// Tagged verdict for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    Failure { reason: String },
}

/// Turns raw command output into success or failure
pub trait OutcomeClassifier: Send + Sync {
    fn classify(&self, operation: Operation, output: &CommandOutput) -> Classification;
}

/// Classifier looking for literal success markers in stdout
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
    /// Matched case-insensitively
    connect_marker: String,
    /// Matched case-sensitively
    install_marker: String,
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new("connected", "Success")
    }
}

impl MarkerClassifier {
    pub fn new(connect_marker: impl Into<String>, install_marker: impl Into<String>) -> Self {
        Self {
            connect_marker: connect_marker.into().to_lowercase(),
            install_marker: install_marker.into(),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(&config.connect_marker, &config.install_marker)
    }

    /// A blank marker never matches
    fn has_marker(&self, operation: Operation, stdout: &str) -> bool {
        match operation {
            Operation::Connect => {
                !self.connect_marker.trim().is_empty()
                    && stdout.to_lowercase().contains(&self.connect_marker)
            }
            Operation::Install => {
                !self.install_marker.trim().is_empty() && stdout.contains(&self.install_marker)
            }
            Operation::Disconnect => true,
        }
    }
}

impl OutcomeClassifier for MarkerClassifier {
    fn classify(&self, operation: Operation, output: &CommandOutput) -> Classification {
        if output.timed_out {
            return Classification::Failure {
                reason: output.stderr.clone(),
            };
        }

        if output.exit_success && self.has_marker(operation, &output.stdout) {
            return Classification::Success;
        }

        let detail = diagnostic(output);
        let reason = if output.exit_success {
            format!("{} not confirmed by bridge output: {}", operation, detail)
        } else {
            detail
        };
        Classification::Failure { reason }
    }
}

/// Verbatim stdout and stderr, or the exit code when both are empty
pub fn diagnostic(output: &CommandOutput) -> String {
    let parts: Vec<&str> = [output.stdout.trim(), output.stderr.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

    if !parts.is_empty() {
        return parts.join("\n");
    }

    match output.exit_code {
        Some(code) => format!("exit code {} with no output", code),
        None => "terminated without exit code".into(),
    }
}
