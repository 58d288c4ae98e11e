//! Static inventory registry backed by the configuration file

use super::{is_eligible, DeviceRegistry};
use crate::config::InventoryEntry;
use async_trait::async_trait;
use fleet_shared::{Device, DeviceAddress, DeviceId, RegistryError};

/// Registry over a fixed list of devices
#[derive(Debug, Clone)]
pub struct InventoryRegistry {
    entries: Vec<InventoryEntry>,
    port: u16,
}

impl InventoryRegistry {
    /// Create a registry from inventory entries; `port` is the bridge port
    pub fn new(entries: Vec<InventoryEntry>, port: u16) -> Self {
        Self { entries, port }
    }
}

#[async_trait]
impl DeviceRegistry for InventoryRegistry {
    async fn fetch_eligible_devices(&self) -> Result<Vec<Device>, RegistryError> {
        let mut devices: Vec<Device> = self
            .entries
            .iter()
            .filter(|e| is_eligible(&e.status, e.ip.as_deref()))
            .filter_map(|e| {
                let ip = e.ip.as_deref()?;
                Some(Device {
                    id: DeviceId(e.id),
                    name: e.name.clone(),
                    address: DeviceAddress::new(ip.trim(), self.port),
                    current_version: e.app_version.clone(),
                })
            })
            .collect();

        devices.sort_by_key(|d| d.id);

        let mut ids: Vec<DeviceId> = devices.iter().map(|d| d.id).collect();
        ids.dedup();
        if ids.len() != devices.len() {
            return Err(RegistryError::Decode(
                "inventory lists the same device id twice".into(),
            ));
        }

        Ok(devices)
    }

    fn name(&self) -> &'static str {
        "inventory"
    }
}
