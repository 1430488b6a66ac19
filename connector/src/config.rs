//! Configuration for the connector

use crate::{
    Error, Result, DEFAULT_GLOBAL_PREFIX, DEFAULT_HEARTBEAT_FAILURE_THRESHOLD,
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_MAX_HOLD_WINDOW_MS, DEFAULT_MIN_EXPIRATION_WINDOW_MS,
    DEFAULT_MIN_MESSAGE_WINDOW_MS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_ROUTE_BROADCAST_INTERVAL_MS,
    DEFAULT_ROUTE_HOLD_DOWN_MS,
};
use packet_core::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Node address; learned from a parent over ILDCP when absent
    pub ilp_address: Option<Address>,

    /// Prefix every route must fall under (`g` in production)
    pub global_prefix: String,

    /// Expiry windows
    pub expiry: ExpiryConfig,

    /// Heartbeat probing
    pub heartbeat: HeartbeatConfig,

    /// Route broadcasting
    pub routing: RoutingConfig,

    /// Echo protocol
    pub echo: EchoConfig,

    /// Peer store file; in-memory store when absent
    pub store_path: Option<PathBuf>,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            ilp_address: None,
            global_prefix: DEFAULT_GLOBAL_PREFIX.to_string(),
            expiry: ExpiryConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            routing: RoutingConfig::default(),
            echo: EchoConfig::default(),
            store_path: None,
            log_format: LogFormat::default(),
        }
    }
}

/// Expiry windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Time a packet must have left when it arrives plus when it leaves (ms)
    pub min_expiration_window_ms: u64,
    /// Longest time a forwarded packet may be held (ms)
    pub max_hold_window_ms: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            min_expiration_window_ms: DEFAULT_MIN_EXPIRATION_WINDOW_MS,
            max_hold_window_ms: DEFAULT_MAX_HOLD_WINDOW_MS,
        }
    }
}

impl ExpiryConfig {
    /// Minimum window required on an incoming packet
    pub fn min_incoming_window(&self) -> Duration {
        Duration::from_millis(self.min_expiration_window_ms / 2)
    }

    /// Window reserved when reducing the outgoing expiry
    pub fn min_outgoing_window(&self) -> Duration {
        Duration::from_millis(self.min_expiration_window_ms - self.min_expiration_window_ms / 2)
    }

    /// Maximum hold window
    pub fn max_hold_window(&self) -> Duration {
        Duration::from_millis(self.max_hold_window_ms)
    }
}

/// Heartbeat probing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Run the probe loop
    pub enabled: bool,
    /// Probe interval (ms)
    pub interval_ms: u64,
    /// Consecutive failures before a peer is marked down
    pub failure_threshold: u32,
    /// Probe timeout (ms)
    pub probe_timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            failure_threshold: DEFAULT_HEARTBEAT_FAILURE_THRESHOLD,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

/// Route broadcasting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Run the broadcast loop
    pub broadcast_enabled: bool,
    /// Broadcast interval (ms)
    pub broadcast_interval_ms: u64,
    /// Hold-down time advertised in updates (ms)
    pub hold_down_ms: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            broadcast_enabled: true,
            broadcast_interval_ms: DEFAULT_ROUTE_BROADCAST_INTERVAL_MS,
            hold_down_ms: DEFAULT_ROUTE_HOLD_DOWN_MS,
        }
    }
}

/// Echo protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Amount the echo response expiry is reduced by (ms)
    pub min_message_window_ms: u64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            min_message_window_ms: DEFAULT_MIN_MESSAGE_WINDOW_MS,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl ConnectorConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConnectorConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = ConnectorConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CONNECTOR_*` overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(address) = std::env::var("CONNECTOR_ILP_ADDRESS") {
            self.ilp_address = Some(
                Address::new(address)
                    .map_err(|e| Error::Config(format!("CONNECTOR_ILP_ADDRESS: {}", e)))?,
            );
        }
        if let Ok(prefix) = std::env::var("CONNECTOR_GLOBAL_PREFIX") {
            self.global_prefix = prefix;
        }
        if let Ok(path) = std::env::var("CONNECTOR_STORE_PATH") {
            self.store_path = Some(PathBuf::from(path));
        }
        if let Ok(format) = std::env::var("CONNECTOR_LOG_FORMAT") {
            self.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(Error::Config(format!("unknown log format {:?}", other)));
                }
            };
        }
        if let Some(ms) = env_number("CONNECTOR_MIN_EXPIRATION_WINDOW_MS")? {
            self.expiry.min_expiration_window_ms = ms;
        }
        if let Some(ms) = env_number("CONNECTOR_MAX_HOLD_WINDOW_MS")? {
            self.expiry.max_hold_window_ms = ms;
        }
        if let Some(ms) = env_number("CONNECTOR_HEARTBEAT_INTERVAL_MS")? {
            self.heartbeat.interval_ms = ms;
        }
        if let Some(ms) = env_number("CONNECTOR_ROUTE_BROADCAST_INTERVAL_MS")? {
            self.routing.broadcast_interval_ms = ms;
        }
        Ok(())
    }

    /// Check invariants between settings
    pub fn validate(&self) -> Result<()> {
        if !Address::is_valid_prefix(&self.global_prefix) {
            return Err(Error::Config(format!(
                "invalid global prefix {:?}",
                self.global_prefix
            )));
        }
        if let Some(address) = &self.ilp_address {
            if !address.has_prefix(&self.global_prefix) {
                return Err(Error::Config(format!(
                    "address {} is not under global prefix {}",
                    address, self.global_prefix
                )));
            }
        }
        if self.expiry.max_hold_window_ms == 0 {
            return Err(Error::Config("max_hold_window_ms must be positive".into()));
        }
        if self.heartbeat.interval_ms == 0 || self.routing.broadcast_interval_ms == 0 {
            return Err(Error::Config("intervals must be positive".into()));
        }
        if self.heartbeat.failure_threshold == 0 {
            return Err(Error::Config("failure_threshold must be positive".into()));
        }
        Ok(())
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectorConfig::default();
        assert_eq!(config.global_prefix, "test");
        assert_eq!(config.expiry.min_expiration_window_ms, 2_000);
        assert_eq!(config.echo.min_message_window_ms, 1_500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_windows_split_evenly() {
        let expiry = ExpiryConfig::default();
        assert_eq!(expiry.min_incoming_window(), Duration::from_millis(1_000));
        assert_eq!(expiry.min_outgoing_window(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_partial_toml() {
        let config: ConnectorConfig = toml::from_str(
            r#"
            ilp_address = "test.node"

            [heartbeat]
            failure_threshold = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.ilp_address.unwrap().as_str(), "test.node");
        assert_eq!(config.heartbeat.failure_threshold, 5);
        assert_eq!(config.heartbeat.interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connector.toml");
        std::fs::write(&path, "global_prefix = \"g\"\nlog_format = \"json\"\n").unwrap();
        let config = ConnectorConfig::from_file(&path).unwrap();
        assert_eq!(config.global_prefix, "g");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_address_outside_global_prefix() {
        let config = ConnectorConfig {
            ilp_address: Some(Address::new("g.node").unwrap()),
            ..ConnectorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
