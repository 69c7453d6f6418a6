//! Configuration for netguardd.
//!
//! Loads settings from /etc/netguard/config.toml or uses defaults. All
//! values are static for the process lifetime.

use anyhow::Result;
use netguard_common::types::GatewayPair;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/netguard/config.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/netguard/config.toml";

/// Managed device (SNMP agent + command execution surface)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Agent address
    #[serde(default = "default_host")]
    pub host: String,

    /// Read community
    #[serde(default = "default_community")]
    pub community: String,

    /// Write community for set operations
    #[serde(default = "default_write_community")]
    pub write_community: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,

    /// Retry count per request (bounded, <= 2)
    #[serde(default = "default_snmp_retries")]
    pub retries: u8,

    /// Container name for corrective commands. When set, commands run via
    /// `docker exec`; when absent they run on the local host.
    #[serde(default)]
    pub container: Option<String>,
}

fn default_host() -> String {
    "device-node".to_string()
}

fn default_community() -> String {
    "public".to_string()
}

fn default_write_community() -> String {
    "private".to_string()
}

fn default_snmp_timeout() -> u64 {
    1
}

fn default_snmp_retries() -> u8 {
    1
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            community: default_community(),
            write_community: default_write_community(),
            timeout_secs: default_snmp_timeout(),
            retries: default_snmp_retries(),
            container: None,
        }
    }
}

/// Control loop cadence and trigger polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between control cycles
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    /// Directory checked once per cycle for trigger files
    #[serde(default = "default_trigger_dir")]
    pub trigger_dir: PathBuf,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_trigger_dir() -> PathBuf {
    PathBuf::from(netguard_common::triggers::DEFAULT_TRIGGER_DIR)
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            trigger_dir: default_trigger_dir(),
        }
    }
}

/// Traffic anomaly detection and quarantine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Instantaneous rate (in or out) above which an interface is
    /// quarantined, in MiB/s
    #[serde(default = "default_threshold_mibps")]
    pub threshold_mibps: f64,

    /// Quarantine duration before timed release, in seconds
    #[serde(default = "default_quarantine_secs")]
    pub quarantine_secs: u64,
}

fn default_threshold_mibps() -> f64 {
    10.0
}

fn default_quarantine_secs() -> u64 {
    30
}

impl AnomalyConfig {
    /// Threshold in the internal unit (bytes/second).
    pub fn threshold_bps(&self) -> f64 {
        self.threshold_mibps * 1024.0 * 1024.0
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold_mibps: default_threshold_mibps(),
            quarantine_secs: default_quarantine_secs(),
        }
    }
}

/// The two upstream gateways and liveness probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_primary_gateway")]
    pub primary: Ipv4Addr,

    #[serde(default = "default_backup_gateway")]
    pub backup: Ipv4Addr,

    /// Ping timeout in seconds (bounded-latency probe)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Consecutive probe failures before a gateway counts as dead.
    /// 1 reacts on the current cycle's probe; higher values add hysteresis.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_primary_gateway() -> Ipv4Addr {
    Ipv4Addr::new(172, 25, 0, 101)
}

fn default_backup_gateway() -> Ipv4Addr {
    Ipv4Addr::new(172, 25, 0, 102)
}

fn default_probe_timeout() -> u64 {
    1
}

fn default_failure_threshold() -> u32 {
    1
}

impl GatewayConfig {
    pub fn pair(&self) -> GatewayPair {
        GatewayPair::new(self.primary, self.backup)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_gateway(),
            backup: default_backup_gateway(),
            probe_timeout_secs: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Shared graph store endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SPARQL update endpoint
    #[serde(default = "default_update_url")]
    pub update_url: String,

    #[serde(default = "default_store_user")]
    pub username: String,

    #[serde(default = "default_store_password")]
    pub password: String,
}

fn default_update_url() -> String {
    "http://jena-fuseki:3030/network/update".to_string()
}

fn default_store_user() -> String {
    "admin".to_string()
}

fn default_store_password() -> String {
    "admin".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            update_url: default_update_url(),
            username: default_store_user(),
            password: default_store_password(),
        }
    }
}

/// Full daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub gateways: GatewayConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load config from the standard locations, or return defaults.
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from a specific path.
    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded config from {}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.host, "device-node");
        assert_eq!(config.poll.interval_secs, 2);
        assert_eq!(config.anomaly.threshold_mibps, 10.0);
        assert_eq!(config.gateways.failure_threshold, 1);
        assert_eq!(config.device.retries, 1);
    }

    #[test]
    fn test_threshold_unit_conversion() {
        let anomaly = AnomalyConfig {
            threshold_mibps: 2.0,
            quarantine_secs: 30,
        };
        assert_eq!(anomaly.threshold_bps(), 2.0 * 1024.0 * 1024.0);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[device]
host = "10.0.0.5"
container = "lab-router"

[gateways]
primary = "192.168.1.1"
backup = "192.168.1.2"
failure_threshold = 3

[anomaly]
threshold_mibps = 5.5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.host, "10.0.0.5");
        assert_eq!(config.device.container.as_deref(), Some("lab-router"));
        assert_eq!(config.gateways.primary, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(config.gateways.failure_threshold, 3);
        assert_eq!(config.anomaly.threshold_mibps, 5.5);
        // Defaults for missing fields
        assert_eq!(config.anomaly.quarantine_secs, 30);
        assert_eq!(config.poll.interval_secs, 2);
    }

    #[test]
    fn test_gateway_pair() {
        let config = Config::default();
        let pair = config.gateways.pair();
        assert_eq!(pair.primary, config.gateways.primary);
        assert_eq!(pair.other(pair.primary), config.gateways.backup);
    }
}
