//! Device Update State Machine
//!
//! Defines the valid stage transitions for one device during a rollout.
//! Stages only move forward. Disconnecting is reachable from both install
//! results, and the terminal status is fixed before it is entered.

use crate::OutcomeStatus;
use std::fmt;

/// Stages of one device's update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStage {
    Pending,
    Connecting,
    Connected,
    ConnectFailed,
    Installing,
    Installed,
    InstallFailed,
    Disconnecting,
    Done,
}

impl fmt::Display for DeviceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceStage::Pending => "pending",
            DeviceStage::Connecting => "connecting",
            DeviceStage::Connected => "connected",
            DeviceStage::ConnectFailed => "connect failed",
            DeviceStage::Installing => "installing",
            DeviceStage::Installed => "installed",
            DeviceStage::InstallFailed => "install failed",
            DeviceStage::Disconnecting => "disconnecting",
            DeviceStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Events that drive stage transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    ConnectStarted,
    ConnectSucceeded,
    ConnectFailed,
    InstallStarted,
    InstallSucceeded,
    InstallFailed,
    DisconnectStarted,
    DisconnectFinished,
}

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid and the stage changed
    Success(DeviceStage),
    /// Transition is not allowed from the current stage
    Invalid { from: DeviceStage, event: StageEvent },
}

/// Per-device stage tracker
#[derive(Debug)]
pub struct DeviceStateMachine {
    current_stage: DeviceStage,
    status: Option<OutcomeStatus>,
    connected: bool,
}

impl Default for DeviceStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateMachine {
    /// Create a new state machine in Pending
    pub fn new() -> Self {
        Self {
            current_stage: DeviceStage::Pending,
            status: None,
            connected: false,
        }
    }

    /// Get the current stage
    pub fn stage(&self) -> DeviceStage {
        self.current_stage
    }

    /// Whether the device ever reached Connected
    pub fn has_connected(&self) -> bool {
        self.connected
    }

    /// Status to record when processing stops on an unclassified fault
    pub fn fault_status(&self) -> OutcomeStatus {
        match self.status {
            Some(status) => status,
            None if self.connected => OutcomeStatus::InstallFailed,
            None => OutcomeStatus::ConnectFailed,
        }
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: StageEvent) -> TransitionResult {
        match self.get_next_stage(event) {
            Some(stage) => {
                self.current_stage = stage;
                match stage {
                    DeviceStage::Connected => self.connected = true,
                    DeviceStage::ConnectFailed => self.status = Some(OutcomeStatus::ConnectFailed),
                    DeviceStage::Installed => self.status = Some(OutcomeStatus::Succeeded),
                    DeviceStage::InstallFailed => self.status = Some(OutcomeStatus::InstallFailed),
                    _ => {}
                }
                TransitionResult::Success(stage)
            }
            None => TransitionResult::Invalid {
                from: self.current_stage,
                event,
            },
        }
    }

    /// Get the next stage for a given event, if the transition is valid
    fn get_next_stage(&self, event: StageEvent) -> Option<DeviceStage> {
        use DeviceStage::*;

        match (self.current_stage, event) {
            (Pending, StageEvent::ConnectStarted) => Some(Connecting),

            (Connecting, StageEvent::ConnectSucceeded) => Some(Connected),
            (Connecting, StageEvent::ConnectFailed) => Some(ConnectFailed),

            (Connected, StageEvent::InstallStarted) => Some(Installing),

            (Installing, StageEvent::InstallSucceeded) => Some(Installed),
            (Installing, StageEvent::InstallFailed) => Some(InstallFailed),

            // Disconnect follows any install result
            (Installed | InstallFailed, StageEvent::DisconnectStarted) => Some(Disconnecting),

            (Disconnecting, StageEvent::DisconnectFinished) => Some(Done),

            _ => None,
        }
    }
}
