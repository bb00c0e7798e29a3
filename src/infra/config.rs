//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{anyhow, Context};
use h3o::Resolution;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    /// H3 resolution, 0 (coarsest) to 15
    #[serde(default = "default_resolution")]
    pub resolution: u8,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { resolution: default_resolution() }
    }
}

fn default_resolution() -> u8 {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_uplink_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_uplink_topic() -> String {
    "uplinks/chirpstack/mappers/t1000/v0/json".to_string()
}

fn default_client_id() -> String {
    "wavemap".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    /// HTTP port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_http_bind_address(), port: default_http_port() }
    }
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { center_latitude: 47.5442, center_longitude: 7.5886 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// JSONL journal file (in-memory only when unset)
    #[serde(default)]
    pub journal_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Bounded queue between MQTT delivery and scoring
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Name given to trackers whose uplinks carry none
    #[serde(default = "default_display_name")]
    pub default_display_name: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            default_display_name: default_display_name(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_display_name() -> String {
    "Noname".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UplinkLogConfig {
    /// Raw uplink debug log (disabled when unset)
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run an embedded MQTT broker (local development)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_broker_bind_address(),
            port: default_broker_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub grid: GridConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub uplink_log: UplinkLogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    resolution: Resolution,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_tls: bool,
    mqtt_client_id: String,
    http_bind_address: String,
    http_port: u16,
    map_center: (f64, f64),
    journal_file: Option<String>,
    queue_capacity: usize,
    default_display_name: String,
    uplink_log_file: Option<String>,
    metrics_interval_secs: u64,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: Resolution::Eight,
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_topic: default_uplink_topic(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_tls: false,
            mqtt_client_id: default_client_id(),
            http_bind_address: default_http_bind_address(),
            http_port: default_http_port(),
            map_center: (47.5442, 7.5886),
            journal_file: None,
            queue_capacity: default_queue_capacity(),
            default_display_name: default_display_name(),
            uplink_log_file: None,
            metrics_interval_secs: default_metrics_interval(),
            broker_enabled: false,
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_broker_port(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let resolution = Resolution::try_from(toml_config.grid.resolution).map_err(|_| {
            anyhow!(
                "Invalid grid resolution {} in {} (expected 0..=15)",
                toml_config.grid.resolution,
                path.display()
            )
        })?;

        if toml_config.ingest.queue_capacity == 0 {
            anyhow::bail!("ingest.queue_capacity must be positive in {}", path.display());
        }

        Ok(Self {
            resolution,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_topic: toml_config.mqtt.topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_tls: toml_config.mqtt.tls,
            mqtt_client_id: toml_config.mqtt.client_id,
            http_bind_address: toml_config.http.bind_address,
            http_port: toml_config.http.port,
            map_center: (toml_config.map.center_latitude, toml_config.map.center_longitude),
            journal_file: toml_config.store.journal_file,
            queue_capacity: toml_config.ingest.queue_capacity,
            default_display_name: toml_config.ingest.default_display_name,
            uplink_log_file: toml_config.uplink_log.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_tls(&self) -> bool {
        self.mqtt_tls
    }

    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    pub fn http_bind_address(&self) -> &str {
        &self.http_bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Map centre as (lat, lng)
    pub fn map_center(&self) -> (f64, f64) {
        self.map_center
    }

    pub fn journal_file(&self) -> Option<&str> {
        self.journal_file.as_deref()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn default_display_name(&self) -> &str {
        &self.default_display_name
    }

    pub fn uplink_log_file(&self) -> Option<&str> {
        self.uplink_log_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
