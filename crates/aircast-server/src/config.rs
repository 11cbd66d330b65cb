//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (AIRCAST_*)
//! - TOML configuration file

use aircast_core::{AccessPolicy, AllowAll, OriginPolicy, RouterConfig, TokenPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

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

    /// Broadcaster role gate.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Status broadcast cadence.
    #[serde(default)]
    pub status: StatusConfig,

    /// Relay flow control sizing.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Broadcaster role gate configuration.
///
/// With a token configured, register-broadcaster messages must carry it.
/// Otherwise, with an origin configured, only connections from that host
/// may claim the role. With neither, the relay runs open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Host address allowed to claim the broadcaster role.
    #[serde(default)]
    pub broadcaster_origin: Option<String>,

    /// Shared secret required in the broadcaster registration message.
    #[serde(default)]
    pub broadcaster_token: Option<String>,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Probe interval in milliseconds. A connection that misses a full
    /// interval after being probed is evicted.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
}

/// Status broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Broadcast interval in milliseconds.
    #[serde(default = "default_status_interval")]
    pub interval_ms: u64,
}

/// Relay flow control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Recent-frame ring capacity used to seed late joiners.
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,

    /// Per-listener outbound queue capacity.
    #[serde(default = "default_listener_queue_frames")]
    pub listener_queue_frames: usize,
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
    std::env::var("AIRCAST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("AIRCAST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_status_interval() -> u64 {
    1_500
}

fn default_buffer_frames() -> usize {
    8
}

fn default_listener_queue_frames() -> usize {
    32
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
            auth: AuthConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            status: StatusConfig::default(),
            relay: RelayConfig::default(),
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

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_status_interval(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_frames: default_buffer_frames(),
            listener_queue_frames: default_listener_queue_frames(),
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
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "aircast.toml",
            "/etc/aircast/aircast.toml",
            "~/.config/aircast/aircast.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Router sizing derived from this configuration.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            relay_buffer_frames: self.relay.buffer_frames,
            listener_queue_frames: self.relay.listener_queue_frames,
        }
    }

    /// The access policy selected by the auth section.
    ///
    /// A configured token takes precedence over an origin pin.
    #[must_use]
    pub fn access_policy(&self) -> Box<dyn AccessPolicy> {
        if let Some(token) = &self.auth.broadcaster_token {
            Box::new(TokenPolicy::new(token.clone()))
        } else if let Some(origin) = &self.auth.broadcaster_origin {
            Box::new(OriginPolicy::new(origin.clone()))
        } else {
            Box::new(AllowAll)
        }
    }
}
