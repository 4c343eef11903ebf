//! Server configuration.
//!
//! Configuration is layered:
//! - Built-in defaults
//! - The first TOML file found in the search paths
//! - Environment variables (`MURMUR_PORT`, `MURMUR_STORE__BASE_URL`, ...)

use anyhow::{Context, Result};
use murmur_core::{ErrorPolicy, RegistryConfig, RelayConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Configuration files, in order of preference.
const CONFIG_PATHS: [&str; 3] = [
    "murmur.toml",
    "/etc/murmur/murmur.toml",
    "~/.config/murmur/murmur.toml",
];

/// Prefix of environment overrides.
const ENV_PREFIX: &str = "MURMUR";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// External bulletin-board store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Relay behaviour.
    #[serde(default)]
    pub relay: RelaySettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound message size in bytes, for both the WebSocket layer
    /// and the frame decoder.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// External store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the bulletin-board API.
    #[serde(default = "default_store_url")]
    pub base_url: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// What to do with malformed frames and failed persists.
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Per-recipient send timeout during a broadcast, in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_store_url() -> String {
    "https://detabase.vercel.app".to_string()
}

fn default_store_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

fn default_send_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            store: StoreConfig::default(),
            relay: RelaySettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_ms: default_store_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl StoreConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::default(),
            send_timeout_ms: default_send_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            let path = Path::new(expanded.as_ref());
            if path.exists() {
                tracing::info!("Loading configuration from {}", path.display());
                builder = builder.add_source(config::File::from(path).required(true));
                break;
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Registry settings derived from this configuration.
    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_sessions: self.limits.max_connections,
            send_timeout: Duration::from_millis(self.relay.send_timeout_ms),
        }
    }

    /// Relay settings derived from this configuration.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            error_policy: self.relay.error_policy,
            store_timeout: self.store.timeout(),
            max_frame_size: self.limits.max_message_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.store.base_url, "https://detabase.vercel.app");
        assert_eq!(config.store.timeout(), Duration::from_secs(5));
        assert_eq!(config.relay.error_policy, ErrorPolicy::Close);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 50000

            [store]
            base_url = "http://localhost:4000"
            timeout_ms = 1500

            [relay]
            error_policy = "report"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
        assert_eq!(config.store.base_url, "http://localhost:4000");
        assert_eq!(config.store.user_agent, "Mozilla/5.0");
        assert_eq!(config.relay.error_policy, ErrorPolicy::Report);
    }

    #[test]
    fn test_derived_settings() {
        let mut config = Config::default();
        config.limits.max_connections = 3;
        config.relay.send_timeout_ms = 250;
        config.store.timeout_ms = 1_000;
        config.limits.max_message_size = 256 * 1024;

        let registry = config.registry_config();
        assert_eq!(registry.max_sessions, 3);
        assert_eq!(registry.send_timeout, Duration::from_millis(250));
        let relay = config.relay_config();
        assert_eq!(relay.store_timeout, Duration::from_secs(1));
        assert_eq!(relay.max_frame_size, 256 * 1024);
    }
}
