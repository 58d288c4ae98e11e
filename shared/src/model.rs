//! Rollout data model
//!
//! Devices are read-only snapshots taken once at rollout start. Outcomes and
//! the aggregate result are produced by the orchestrator and never flow back
//! into the registry.

use chrono::{DateTime, Utc};
use std::fmt;

/// Opaque device identity, ordered as the registry orders it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub i64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network address of a device's debug bridge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A device eligible for update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub address: DeviceAddress,
    /// Installed application version, if the device ever reported one
    pub current_version: Option<String>,
}

impl Device {
    /// Version string for display
    pub fn version_label(&self) -> &str {
        self.current_version.as_deref().unwrap_or("unknown")
    }
}

/// Terminal classification of one device's update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    ConnectFailed,
    InstallFailed,
    /// Interrupted by the operator while in progress
    Aborted,
}

impl OutcomeStatus {
    pub fn is_success(self) -> bool {
        self == OutcomeStatus::Succeeded
    }

    pub fn is_failure(self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Succeeded => write!(f, "succeeded"),
            OutcomeStatus::ConnectFailed => write!(f, "connect failed"),
            OutcomeStatus::InstallFailed => write!(f, "install failed"),
            OutcomeStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of one device's pass through the rollout
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub device: Device,
    pub status: OutcomeStatus,
    /// Human-readable diagnostic, set for every failure
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether the install command was issued
    pub install_attempted: bool,
    /// Whether a disconnect was issued
    pub disconnect_attempted: bool,
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// How a rollout pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    NormalCompletion,
    UserInterrupted,
}

/// Aggregate result of a rollout pass
#[derive(Debug, Clone)]
pub struct RolloutResult {
    /// One outcome per attempted device, in fetch order
    pub outcomes: Vec<UpdateOutcome>,
    /// Number of devices fetched from the registry
    pub fetched: usize,
    pub completion: Completion,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RolloutResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failure()).count()
    }

    /// Devices actually attempted; at most `total()`
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Devices fetched for this pass
    pub fn total(&self) -> usize {
        self.fetched
    }

    pub fn was_interrupted(&self) -> bool {
        self.completion == Completion::UserInterrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: i64) -> Device {
        Device {
            id: DeviceId(id),
            name: format!("screen-{}", id),
            address: DeviceAddress::new(format!("10.0.0.{}", id), 5555),
            current_version: None,
        }
    }

    fn outcome(id: i64, status: OutcomeStatus) -> UpdateOutcome {
        let at = Utc::now();
        UpdateOutcome {
            device: device(id),
            status,
            message: None,
            started_at: at,
            finished_at: at,
            install_attempted: false,
            disconnect_attempted: false,
        }
    }

    #[test]
    fn test_address_display() {
        let addr = DeviceAddress::new("192.168.1.20", 5555);
        assert_eq!(addr.to_string(), "192.168.1.20:5555");
    }

    #[test]
    fn test_version_label_defaults_to_unknown() {
        let mut d = device(1);
        assert_eq!(d.version_label(), "unknown");
        d.current_version = Some("1.4.2".into());
        assert_eq!(d.version_label(), "1.4.2");
    }

    #[test]
    fn test_result_counts() {
        let at = Utc::now();
        let result = RolloutResult {
            outcomes: vec![
                outcome(1, OutcomeStatus::Succeeded),
                outcome(2, OutcomeStatus::ConnectFailed),
                outcome(3, OutcomeStatus::InstallFailed),
                outcome(4, OutcomeStatus::Aborted),
            ],
            fetched: 6,
            completion: Completion::UserInterrupted,
            started_at: at,
            finished_at: at,
        };

        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 3);
        assert_eq!(result.attempted(), 4);
        assert_eq!(result.total(), 6);
        assert_eq!(result.succeeded() + result.failed(), result.attempted());
        assert!(result.was_interrupted());
    }

    #[test]
    fn test_device_ids_order_numerically() {
        let mut ids = vec![DeviceId(10), DeviceId(2), DeviceId(7)];
        ids.sort();
        assert_eq!(ids, vec![DeviceId(2), DeviceId(7), DeviceId(10)]);
    }
}
