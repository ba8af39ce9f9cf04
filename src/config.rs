//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::BroadcastPolicy;
use crate::websocket::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reading store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("ews").join("ews.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./ews_data/ews.db".to_string())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_size() -> usize {
    64 * 1024
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// MQTT sensor bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_enabled")]
    pub enabled: bool,

    /// Broker address: `tcp://host:port`, `mqtt://host:port` or `host:port`
    #[serde(default = "default_broker")]
    pub broker: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// Delivery guarantee level (0, 1 or 2)
    #[serde(default)]
    pub qos: u8,

    pub username: Option<String>,

    pub password: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Capacity of the client's request channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long to wait for the DISCONNECT to go out on shutdown
    #[serde(default = "default_disconnect_timeout")]
    pub disconnect_timeout_ms: u64,
}

fn default_mqtt_enabled() -> bool {
    true
}

fn default_broker() -> String {
    "tcp://localhost:1883".to_string()
}

fn default_client_id() -> String {
    "ews-backend".to_string()
}

fn default_topic() -> String {
    "ews/sensor".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_keep_alive() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

fn default_disconnect_timeout() -> u64 {
    250
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_enabled(),
            broker: default_broker(),
            client_id: default_client_id(),
            topic: default_topic(),
            qos: 0,
            username: None,
            password: None,
            connect_timeout_secs: default_connect_timeout(),
            keep_alive_secs: default_keep_alive(),
            channel_capacity: default_channel_capacity(),
            disconnect_timeout_ms: default_disconnect_timeout(),
        }
    }
}

impl MqttConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

/// Ingest pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Whether readings reach subscribers when the store write fails
    #[serde(default)]
    pub broadcast_policy: BroadcastPolicy,

    /// Bus readings being stored at once before new ones are shed
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_in_flight() -> usize {
    256
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            broadcast_policy: BroadcastPolicy::default(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// First existing config file among the default locations
    pub fn default_path() -> Option<PathBuf> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("ews").join("config.toml")),
            Some(PathBuf::from("/etc/ews/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        config_paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `EWS_*` overrides; an unknown broadcast policy is an error
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Storage overrides
        if let Some(path) = lookup("EWS_DATABASE_PATH") {
            self.storage.database_path = path;
        }

        // API overrides
        if let Some(host) = lookup("EWS_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("EWS_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // MQTT overrides
        if let Some(enabled) = lookup("EWS_MQTT_ENABLED") {
            self.mqtt.enabled = enabled.to_lowercase() != "false" && enabled != "0";
        }
        if let Some(broker) = lookup("EWS_MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(client_id) = lookup("EWS_MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(topic) = lookup("EWS_MQTT_TOPIC") {
            self.mqtt.topic = topic;
        }
        if let Some(qos) = lookup("EWS_MQTT_QOS") {
            if let Ok(q) = qos.parse() {
                self.mqtt.qos = q;
            }
        }
        if let Some(username) = lookup("EWS_MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("EWS_MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }

        // Ingest overrides
        if let Some(policy) = lookup("EWS_BROADCAST_POLICY") {
            self.ingest.broadcast_policy = policy.parse().map_err(|error| ConfigError::Env {
                name: "EWS_BROADCAST_POLICY",
                value: policy.clone(),
                error,
            })?;
        }
        if let Some(limit) = lookup("EWS_INGEST_MAX_IN_FLIGHT") {
            if let Ok(n) = limit.parse() {
                self.ingest.max_in_flight = n;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("EWS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("EWS_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value {value:?} for {name}: {error}")]
    Env {
        name: &'static str,
        value: String,
        error: String,
    },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# EWS Configuration
#
# Environment variables override these settings:
# - EWS_DATABASE_PATH
# - EWS_API_HOST, EWS_API_PORT
# - EWS_MQTT_ENABLED, EWS_MQTT_BROKER, EWS_MQTT_CLIENT_ID, EWS_MQTT_TOPIC, EWS_MQTT_QOS
# - EWS_MQTT_USERNAME, EWS_MQTT_PASSWORD
# - EWS_BROADCAST_POLICY, EWS_INGEST_MAX_IN_FLIGHT
# - EWS_LOG_LEVEL, EWS_LOG_FORMAT

[storage]
# SQLite database file for readings
database_path = "./ews_data/ews.db"

[api]
host = "0.0.0.0"
port = 8080

# Maximum request body size (bytes)
max_body_size = 65536

[mqtt]
# Subscribe to the sensor topic on startup
enabled = true

broker = "tcp://localhost:1883"
client_id = "ews-backend"
topic = "ews/sensor"

# Delivery guarantee: 0 = at most once, 1 = at least once, 2 = exactly once
qos = 0

# username = ""
# password = ""

connect_timeout_secs = 30
keep_alive_secs = 30
channel_capacity = 64
disconnect_timeout_ms = 250

[hub]
# Maximum concurrent WebSocket subscribers
max_connections = 1000

# Pending hub commands before broadcasts are shed
command_capacity = 1024

# Readings buffered per subscriber
outbound_capacity = 64

# Consecutive dropped readings before a slow subscriber is disconnected
max_consecutive_drops = 16

# Ping every subscriber this often (seconds)
keepalive_interval_secs = 30

# Disconnect subscribers silent for this long (seconds)
client_timeout_secs = 90

# Grace period for a closing subscriber to flush its close frame (ms)
close_timeout_ms = 1000

# Grace period for closing all subscribers on shutdown (ms)
shutdown_timeout_ms = 5000

[ingest]
# What to do with a reading when the store write fails:
# "always" still broadcasts it, "persisted_only" drops it
broadcast_policy = "always"

# Bus readings stored concurrently; further readings are dropped until one finishes
max_in_flight = 256

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
