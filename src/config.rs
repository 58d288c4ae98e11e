//! Rollout configuration
//!
//! Everything the rollout needs is passed in explicitly through
//! [`RolloutConfig`]. It is layered from defaults, a TOML file and a couple of
//! environment overrides; any missing field falls back to its documented default.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use fleet_shared::timing;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "FLEET_ROLLOUT_CONFIG";

/// Configuration file used when [`CONFIG_PATH_ENV`] is unset
pub const DEFAULT_CONFIG_PATH: &str = "fleet-rollout.toml";

/// Environment variables overriding single keys, with their key paths
const ENV_OVERRIDES: [(&str, &str); 2] = [
    ("DATABASE_URL", "registry.database_url"),
    ("FLEET_PACKAGE_PATH", "rollout.package_path"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {0} not found")]
    NotFound(PathBuf),

    #[error("failed to load configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    pub registry: RegistryConfig,
    pub transport: TransportConfig,
    pub rollout: RolloutSettings,
}

/// Where the eligible device list comes from
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// PostgreSQL connection URL of the device database
    pub database_url: Option<String>,
    /// Static inventory, used when no database is configured
    pub devices: Vec<InventoryEntry>,
}

/// One device of a static inventory
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryEntry {
    pub id: i64,
    pub name: String,
    pub ip: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub app_version: Option<String>,
}

fn default_status() -> String {
    "online".into()
}

/// Device bridge invocation and timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bridge executable
    pub program: String,
    /// Port appended to every device host
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub disconnect_timeout_secs: u64,
    /// Substring (case-insensitive) that confirms a connect
    pub connect_marker: String,
    /// Substring (case-sensitive) that confirms an install
    pub install_marker: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            program: "adb".into(),
            port: timing::DEFAULT_BRIDGE_PORT,
            connect_timeout_secs: timing::CONNECT_TIMEOUT_SECS,
            install_timeout_secs: timing::INSTALL_TIMEOUT_SECS,
            disconnect_timeout_secs: timing::DISCONNECT_TIMEOUT_SECS,
            connect_marker: "connected".into(),
            install_marker: "Success".into(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }
}

/// What to record for a device interrupted mid-update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPolicy {
    /// Leave the interrupted device out of the result
    #[default]
    Omit,
    /// Record it with an aborted status
    RecordAborted,
}

/// Rollout pacing and behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    /// Package pushed to every device
    pub package_path: PathBuf,
    /// Pause between two devices
    pub pacing_delay_secs: u64,
    /// Devices holding the bridge at once
    pub max_concurrency: usize,
    pub interrupt_policy: InterruptPolicy,
    /// Skip the interactive confirmation
    pub assume_yes: bool,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            package_path: PathBuf::from("backend/apk/app-debug.apk"),
            pacing_delay_secs: timing::PACING_DELAY_SECS,
            max_concurrency: timing::MAX_CONCURRENCY,
            interrupt_policy: InterruptPolicy::Omit,
            assume_yes: false,
        }
    }
}

impl RolloutSettings {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_secs(self.pacing_delay_secs)
    }
}

impl RolloutConfig {
    /// Load from the file named by the environment, or defaults if it is absent
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. The TOML file (`FLEET_ROLLOUT_CONFIG`, else `fleet-rollout.toml`)
    /// 3. `DATABASE_URL` and `FLEET_PACKAGE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        match Env::var(CONFIG_PATH_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::NotFound(path));
                }
                Self::load_from(&path)
            }
            None => Self::load_from(Path::new(DEFAULT_CONFIG_PATH)),
        }
    }

    /// Load from a specific file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Toml::file(path)).merge(env_overrides()))
    }

    /// Parse a TOML document without consulting the environment
    #[cfg(test)]
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Toml::string(content)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let mut config: Self = figment.extract()?;
        config.registry.database_url = config
            .registry
            .database_url
            .filter(|url| !url.trim().is_empty());
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the rollout meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rollout.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "rollout.max_concurrency must be at least 1".into(),
            ));
        }
        let timeouts = [
            ("connect_timeout_secs", self.transport.connect_timeout_secs),
            ("install_timeout_secs", self.transport.install_timeout_secs),
            ("disconnect_timeout_secs", self.transport.disconnect_timeout_secs),
        ];
        for (name, secs) in timeouts {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "transport.{} must be greater than zero",
                    name
                )));
            }
        }
        if self.transport.program.trim().is_empty() {
            return Err(ConfigError::Invalid("transport.program is empty".into()));
        }
        // An empty marker is contained in every output and would confirm anything
        let markers = [
            ("connect_marker", &self.transport.connect_marker),
            ("install_marker", &self.transport.install_marker),
        ];
        for (name, marker) in markers {
            if marker.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("transport.{} is empty", name)));
            }
        }
        if self.rollout.package_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("rollout.package_path is empty".into()));
        }
        Ok(())
    }
}

/// `DATABASE_URL` and `FLEET_PACKAGE_PATH` mapped onto their keys
fn env_overrides() -> Env {
    let names: Vec<&str> = ENV_OVERRIDES.iter().map(|(name, _)| *name).collect();
    Env::raw().only(&names).map(|key| {
        ENV_OVERRIDES
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).into())
            .unwrap_or_else(|| key.as_str().to_string().into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RolloutConfig::default();
        assert_eq!(config.transport.program, "adb");
        assert_eq!(config.transport.port, 5555);
        assert_eq!(config.transport.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.transport.install_timeout(), Duration::from_secs(120));
        assert_eq!(config.transport.disconnect_timeout(), Duration::from_secs(5));
        assert_eq!(config.rollout.pacing_delay(), Duration::from_secs(3));
        assert_eq!(config.rollout.max_concurrency, 1);
        assert_eq!(config.rollout.interrupt_policy, InterruptPolicy::Omit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RolloutConfig::parse(
            r#"
            [transport]
            install_timeout_secs = 300

            [rollout]
            package_path = "dist/signage.apk"
            interrupt_policy = "record_aborted"

            [[registry.devices]]
            id = 3
            name = "lobby"
            ip = "10.1.0.3"
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.install_timeout_secs, 300);
        assert_eq!(config.transport.connect_timeout_secs, 10);
        assert_eq!(config.rollout.package_path, PathBuf::from("dist/signage.apk"));
        assert_eq!(config.rollout.interrupt_policy, InterruptPolicy::RecordAborted);
        assert_eq!(config.registry.devices.len(), 1);
        assert_eq!(config.registry.devices[0].status, "online");
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "rollout.toml",
                r#"
                [registry]
                database_url = "postgres://file@localhost/cms"

                [rollout]
                package_path = "from-file.apk"
                pacing_delay_secs = 7
                "#,
            )?;
            jail.set_env("DATABASE_URL", "postgres://postgres@localhost/cms");
            jail.set_env("FLEET_PACKAGE_PATH", "/tmp/app.apk");

            let config = RolloutConfig::load_from(Path::new("rollout.toml"))
                .map_err(|e| e.to_string())?;

            assert_eq!(
                config.registry.database_url.as_deref(),
                Some("postgres://postgres@localhost/cms")
            );
            assert_eq!(config.rollout.package_path, PathBuf::from("/tmp/app.apk"));
            assert_eq!(config.rollout.pacing_delay_secs, 7);
            Ok(())
        });
    }

    #[test]
    fn test_load_reads_named_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("lab.toml", "[transport]\nport = 5556\n")?;
            jail.set_env(CONFIG_PATH_ENV, "lab.toml");

            let config = RolloutConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.transport.port, 5556);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_missing_named_file() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(CONFIG_PATH_ENV, "absent.toml");

            let err = RolloutConfig::load().unwrap_err();
            assert!(matches!(err, ConfigError::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_missing_default_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = RolloutConfig::load_from(Path::new(DEFAULT_CONFIG_PATH))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.transport.program, "adb");
            assert_eq!(config.rollout.max_concurrency, 1);
            Ok(())
        });
    }

    #[test]
    fn test_blank_database_url_is_unset() {
        let config = RolloutConfig::parse("[registry]\ndatabase_url = \"  \"\n").unwrap();
        assert!(config.registry.database_url.is_none());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = RolloutConfig::parse("[rollout]\nmax_concurrency = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = RolloutConfig::default();
        config.rollout.max_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = RolloutConfig::default();
        config.transport.install_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("install_timeout_secs"));
    }

    #[test]
    fn test_validate_rejects_empty_markers() {
        let mut config = RolloutConfig::default();
        config.transport.connect_marker = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_marker"));

        let mut config = RolloutConfig::default();
        config.transport.install_marker = "   ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("install_marker"));
    }

    #[test]
    fn test_parse_rejects_empty_marker() {
        let err = RolloutConfig::parse("[transport]\ninstall_marker = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
