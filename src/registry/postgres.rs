//! PostgreSQL device registry

use super::{is_eligible, DeviceRegistry, ONLINE_STATUS};
use async_trait::async_trait;
use fleet_shared::{Device, DeviceAddress, DeviceId, RegistryError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, warn};

/// Eligible devices, ordered for a reproducible rollout
const ELIGIBLE_DEVICES_QUERY: &str = r#"
    SELECT id::BIGINT AS id, name::TEXT AS name, ip::TEXT AS ip,
           app_version::TEXT AS app_version
    FROM devices
    WHERE status = 'online'
      AND ip IS NOT NULL AND ip != 'unknown' AND btrim(ip) <> ''
    ORDER BY id
"#;

/// Registry reading the `devices` table of the fleet database
#[derive(Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
    port: u16,
}

impl PostgresRegistry {
    /// Connect to the device database
    pub async fn connect(url: &str, port: u16) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| RegistryError::Connection(e.to_string()))?;

        Ok(Self { pool, port })
    }
}

/// Columns of one `devices` row
#[derive(Debug, Clone)]
struct DeviceRow {
    id: i64,
    name: Option<String>,
    ip: String,
    app_version: Option<String>,
}

impl DeviceRow {
    fn into_device(self, port: u16) -> Device {
        let id = self.id;
        Device {
            id: DeviceId(id),
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("device-{}", id)),
            address: DeviceAddress::new(self.ip.trim(), port),
            current_version: self.app_version.filter(|v| !v.is_empty()),
        }
    }
}

/// Devices for every reachable row; unreachable rows are skipped, never fatal
fn devices_from_rows(rows: Vec<DeviceRow>, port: u16) -> Vec<Device> {
    rows.into_iter()
        .filter(|row| {
            let reachable = is_eligible(ONLINE_STATUS, Some(row.ip.trim()));
            if !reachable {
                warn!("Skipping device {}: unusable ip {:?}", row.id, row.ip);
            }
            reachable
        })
        .map(|row| row.into_device(port))
        .collect()
}

#[async_trait]
impl DeviceRegistry for PostgresRegistry {
    async fn fetch_eligible_devices(&self) -> Result<Vec<Device>, RegistryError> {
        let rows = sqlx::query(ELIGIBLE_DEVICES_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegistryError::Query(e.to_string()))?;

        debug!("Registry returned {} rows", rows.len());

        let decode = |e: sqlx::Error| RegistryError::Decode(e.to_string());
        let rows = rows
            .iter()
            .map(|row| {
                Ok(DeviceRow {
                    id: row.try_get("id").map_err(decode)?,
                    name: row.try_get("name").map_err(decode)?,
                    ip: row.try_get("ip").map_err(decode)?,
                    app_version: row.try_get("app_version").map_err(decode)?,
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        Ok(devices_from_rows(rows, self.port))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
