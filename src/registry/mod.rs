//! Device registry clients
//!
//! This module handles:
//! - Fetching the snapshot of devices eligible for an update pass
//! - Applying the eligibility rule (online, with a usable address)
//! - Ordering devices by id so rollouts are reproducible
//!
//! The registry is read once, before any device is touched. A failure here
//! is fatal for the run.

mod inventory;
mod postgres;

pub use inventory::InventoryRegistry;
pub use postgres::PostgresRegistry;

use async_trait::async_trait;
use fleet_shared::{Device, RegistryError};

/// Status a device must report to be eligible
pub const ONLINE_STATUS: &str = "online";

/// Address value the registry stores when a device never reported one
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Source of the devices to update
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Fetch every eligible device, ordered by id ascending
    async fn fetch_eligible_devices(&self) -> Result<Vec<Device>, RegistryError>;

    /// Human-readable name for this registry
    fn name(&self) -> &'static str;
}

/// Whether a registry row describes a device we can reach
pub fn is_eligible(status: &str, address: Option<&str>) -> bool {
    status == ONLINE_STATUS
        && matches!(address, Some(addr) if !addr.trim().is_empty() && addr != UNKNOWN_ADDRESS)
}
