//! Remote install transport
//!
//! This module handles:
//! - Running the bridge executable with per-operation timeouts
//! - Classifying raw command output into success or failure
//! - Exposing connect / install / disconnect as structured results

pub mod bridge;
pub mod classifier;
pub mod runner;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use bridge::BridgeTransport;
pub use traits::{ConnectResult, DeviceTransport, DisconnectResult, InstallResult};
