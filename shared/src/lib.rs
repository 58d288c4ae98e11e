//! Fleet Rollout Shared Types
//!
//! This crate provides the data model, the per-device stage state machine and
//! the error taxonomy shared by the rollout binary and its collaborators.

pub mod error;
pub mod model;
pub mod state_machine;

use chrono::{DateTime, Utc};

pub use error::{RegistryError, TransportError};
pub use model::{
    Completion, Device, DeviceAddress, DeviceId, OutcomeStatus, RolloutResult, UpdateOutcome,
};
pub use state_machine::{DeviceStage, DeviceStateMachine, StageEvent, TransitionResult};

/// Get the current wall-clock time in UTC
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Default timing parameters for a rollout
pub mod timing {
    /// Port the device bridge listens on when network debugging is enabled
    pub const DEFAULT_BRIDGE_PORT: u16 = 5555;

    /// Connect is a control operation
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Package transfer plus install on the device
    pub const INSTALL_TIMEOUT_SECS: u64 = 120;

    /// Disconnect is best-effort and kept short
    pub const DISCONNECT_TIMEOUT_SECS: u64 = 5;

    /// Delay between two consecutive devices
    pub const PACING_DELAY_SECS: u64 = 3;

    /// Devices processed at once; 1 keeps the rollout strictly sequential
    pub const MAX_CONCURRENCY: usize = 1;
}
