//! Error taxonomy for the rollout
//!
//! Only two kinds of error ever leave a component: the registry failing
//! before any device is touched, and the command-execution mechanism itself
//! being unavailable. Failed remote operations are ordinary return values.

use thiserror::Error;

/// Failure to obtain the eligible device list. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store could not be reached
    #[error("registry connection failed: {0}")]
    Connection(String),

    /// The eligibility query failed
    #[error("registry query failed: {0}")]
    Query(String),

    /// A row could not be turned into a device
    #[error("invalid device record: {0}")]
    Decode(String),
}

/// Environment-level fault in the command-execution mechanism.
///
/// Never raised for a remote operation that merely failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The executable could not be started at all
    #[error("cannot execute `{program}`: {reason}")]
    Environment { program: String, reason: String },

    /// I/O failure while talking to a running child process
    #[error("command I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create an environment fault for a program
    pub fn environment(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Environment {
            program: program.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_error_message() {
        let err = TransportError::environment("adb", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "cannot execute `adb`: No such file or directory"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
