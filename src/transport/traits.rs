//! Transport trait abstraction for pluggable command execution and device bridges

use super::runner::CommandOutput;
use async_trait::async_trait;
use fleet_shared::{DeviceAddress, TransportError};
use std::path::Path;
use std::time::Duration;

/// Executes an external program with a bounded timeout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`.
    ///
    /// A timeout is an ordinary output with `timed_out` set. Only a fault in
    /// the execution mechanism itself is an error.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, TransportError>;
}

/// Result of a connect attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResult {
    Connected,
    ConnectFailed { reason: String },
}

/// Result of an install attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallResult {
    Installed,
    InstallFailed { reason: String },
}

/// Result of a disconnect attempt; callers only log it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectResult {
    Disconnected,
    DisconnectFailed { reason: String },
}

/// Remote operations against one device
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Open a debug session with the device
    async fn connect(&self, address: &DeviceAddress) -> Result<ConnectResult, TransportError>;

    /// Push and install a package over an open session
    async fn install(
        &self,
        address: &DeviceAddress,
        package: &Path,
    ) -> Result<InstallResult, TransportError>;

    /// Close the session
    async fn disconnect(&self, address: &DeviceAddress)
        -> Result<DisconnectResult, TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
