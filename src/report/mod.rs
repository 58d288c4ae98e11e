//! Rollout progress reporting
//!
//! Reporters observe the orchestrator. They never influence control flow and
//! must render what they are given without altering it.

mod console;

pub use console::ConsoleReporter;

use fleet_shared::{Device, DeviceStage, RolloutResult, UpdateOutcome};

/// Observation points invoked by the orchestrator as side effects
pub trait Reporter: Send + Sync {
    /// The eligible fleet was fetched, before any confirmation
    fn on_fleet_fetched(&self, _devices: &[Device]) {}

    /// The operator declined to start the rollout
    fn on_declined(&self) {}

    /// Processing of a device begins; `position` is 1-based
    fn on_device_start(&self, device: &Device, position: usize, total: usize);

    /// A device moved from one stage to the next
    fn on_stage_transition(&self, device: &Device, from: DeviceStage, to: DeviceStage);

    /// A device reached its recorded outcome
    fn on_device_complete(&self, outcome: &UpdateOutcome);

    /// The rollout pass ended, normally or by interruption
    fn on_rollout_complete(&self, result: &RolloutResult);
}
