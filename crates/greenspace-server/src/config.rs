//! Server configuration.
//!
//! The configuration is a YAML document. Every field has a default, so an
//! empty file (or no file at all) yields a runnable development setup. A few
//! deployment-critical keys can be overridden through `GREENSPACE_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use greenspace_auth::OidcConfig;
use greenspace_control::ControlConfig;
use greenspace_routing::{LonLat, RouteEndpoints};
use greenspace_scheduler::SchedulerConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for this schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },

    /// An environment override has an unusable value.
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },

    /// The values are inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server, logging and database.
    pub server: ServerConfig,
    /// Telemetry broker.
    pub mqtt: MqttConfig,
    /// Identity provider.
    pub auth: AuthConfig,
    /// Route planning.
    pub routing: RoutingConfig,
    /// GPX export storage.
    pub s3: S3Config,
    /// Periodic jobs and plugin eviction.
    pub scheduler: SchedulerSection,
    /// Telemetry ingestion.
    pub sensor: SensorConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// Public URL of the application.
    #[serde(default)]
    pub app_url: String,
    /// Development mode.
    #[serde(default)]
    pub development: bool,
    /// Logging.
    #[serde(default)]
    pub logs: LogConfig,
    /// Embedded database.
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl ServerConfig {
    const fn default_port() -> u16 {
        3000
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            app_url: String::new(),
            development: false,
            logs: LogConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "LogConfig::default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl LogConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Directory of the RocksDB database.
    #[serde(default = "DatabaseConfig::default_path")]
    pub path: PathBuf,
    /// How long opening the database may take (seconds).
    #[serde(default = "DatabaseConfig::default_timeout")]
    pub timeout_seconds: u64,
}

impl DatabaseConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("data/greenspace")
    }

    const fn default_timeout() -> u64 {
        30
    }

    /// Open timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            timeout_seconds: Self::default_timeout(),
        }
    }
}

/// MQTT settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Whether to connect at all.
    #[serde(default)]
    pub enable: bool,
    /// Broker address, `host:port` optionally prefixed with `tcp://` or `mqtt://`.
    #[serde(default = "MqttConfig::default_broker")]
    pub broker: String,
    /// Client identifier.
    #[serde(default = "MqttConfig::default_client_id")]
    pub client_id: String,
    /// Username, if the broker requires one.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Topic filter the sensors publish on.
    #[serde(default = "MqttConfig::default_topic")]
    pub topic: String,
}

impl MqttConfig {
    fn default_broker() -> String {
        "localhost:1883".to_string()
    }

    fn default_client_id() -> String {
        "greenspace-backend".to_string()
    }

    fn default_topic() -> String {
        "greenspace/sensors/+/up".to_string()
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enable: false,
            broker: Self::default_broker(),
            client_id: Self::default_client_id(),
            username: None,
            password: None,
            topic: Self::default_topic(),
        }
    }
}

/// Identity provider settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether plugin logins are checked against the provider.
    pub enable: bool,
    /// Provider connection.
    pub oidc_provider: OidcProviderConfig,
}

/// OIDC provider connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OidcProviderConfig {
    /// Base URL of the provider.
    pub base_url: String,
    /// Realm.
    pub domain_name: String,
    /// Confidential client id.
    pub client_id: String,
    /// Confidential client secret.
    pub client_secret: String,
}

impl From<&OidcProviderConfig> for OidcConfig {
    fn from(provider: &OidcProviderConfig) -> Self {
        Self {
            base_url: provider.base_url.clone(),
            domain_name: provider.domain_name.clone(),
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
        }
    }
}

/// Turn-by-turn backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProvider {
    /// OpenRouteService.
    #[default]
    Ors,
    /// Valhalla.
    Valhalla,
}

/// A service reachable over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Base URL.
    pub host: String,
}

/// Route planning settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Whether routing is available.
    #[serde(default)]
    pub enable: bool,
    /// Turn-by-turn backend.
    #[serde(default)]
    pub provider: RoutingProvider,
    /// Depot, `[lon, lat]`.
    #[serde(default = "RoutingConfig::default_start_point")]
    pub start_point: LonLat,
    /// Return depot, `[lon, lat]`.
    #[serde(default = "RoutingConfig::default_start_point")]
    pub end_point: LonLat,
    /// Refill station, `[lon, lat]`.
    #[serde(default = "RoutingConfig::default_start_point")]
    pub watering_point: LonLat,
    /// OpenRouteService.
    #[serde(default)]
    pub ors: HostConfig,
    /// Valhalla.
    #[serde(default)]
    pub valhalla: HostConfig,
    /// Shipment optimizer endpoint.
    #[serde(default)]
    pub optimization: HostConfig,
}

impl RoutingConfig {
    const fn default_start_point() -> LonLat {
        [9.434_764, 54.768_664]
    }

    /// The configured fixed points.
    #[must_use]
    pub const fn endpoints(&self) -> RouteEndpoints {
        RouteEndpoints {
            start_point: self.start_point,
            end_point: self.end_point,
            watering_point: self.watering_point,
        }
    }

    /// Host of the selected turn-by-turn backend.
    #[must_use]
    pub fn provider_host(&self) -> &str {
        match self.provider {
            RoutingProvider::Ors => &self.ors.host,
            RoutingProvider::Valhalla => &self.valhalla.host,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            provider: RoutingProvider::default(),
            start_point: Self::default_start_point(),
            end_point: Self::default_start_point(),
            watering_point: Self::default_start_point(),
            ors: HostConfig::default(),
            valhalla: HostConfig::default(),
            optimization: HostConfig::default(),
        }
    }
}

/// GPX storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Whether GPX export is available.
    pub enable: bool,
    /// Bucket holding exported routes.
    pub route_gpx: BucketConfig,
}

/// One bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct BucketConfig {
    /// Bucket location; a local directory.
    #[serde(default = "BucketConfig::default_bucket")]
    pub bucket: PathBuf,
}

impl BucketConfig {
    fn default_bucket() -> PathBuf {
        PathBuf::from("data/route-gpx")
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            bucket: Self::default_bucket(),
        }
    }
}

/// Job intervals plus plugin eviction timing.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Stale-sensor and plan reconciliation jobs.
    #[serde(flatten)]
    pub jobs: SchedulerConfig,
    /// Seconds between plugin eviction sweeps.
    #[serde(default = "SchedulerSection::default_plugin_interval")]
    pub plugin_interval_seconds: u64,
    /// Seconds a plugin may stay silent.
    #[serde(default = "SchedulerSection::default_plugin_timeout")]
    pub plugin_timeout_seconds: u64,
}

impl SchedulerSection {
    fn default_plugin_interval() -> u64 {
        ControlConfig::default().plugin_interval_seconds
    }

    fn default_plugin_timeout() -> u64 {
        ControlConfig::default().plugin_timeout_seconds
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            jobs: SchedulerConfig::default(),
            plugin_interval_seconds: Self::default_plugin_interval(),
            plugin_timeout_seconds: Self::default_plugin_timeout(),
        }
    }
}

/// Telemetry ingestion settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Radius in metres within which a sensor binds to a tree.
    #[serde(default = "SensorConfig::default_radius")]
    pub nearest_tree_radius: f64,
}

impl SensorConfig {
    fn default_radius() -> f64 {
        ControlConfig::default().nearest_tree_radius_m
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            nearest_tree_radius: Self::default_radius(),
        }
    }
}

impl Config {
    /// Load from `path`, then apply environment overrides.
    ///
    /// A missing file yields the defaults when `required` is false.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or parsed, an override is
    /// malformed or the result is inconsistent.
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Self::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document. Empty documents yield the defaults.
    ///
    /// # Errors
    ///
    /// Returns the parser error.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Apply `GREENSPACE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEnv` when the port is not a number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GREENSPACE_SERVER_PORT") {
            self.server.port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "GREENSPACE_SERVER_PORT",
                value,
            })?;
        }
        if let Some(value) = lookup("GREENSPACE_DATA_DIR") {
            self.server.database.path = PathBuf::from(value);
        }
        if let Some(value) = lookup("GREENSPACE_MQTT_BROKER") {
            self.mqtt.broker = value;
        }
        if let Some(value) = lookup("GREENSPACE_MQTT_TOPIC") {
            self.mqtt.topic = value;
        }
        if let Some(value) = lookup("GREENSPACE_LOG_LEVEL") {
            self.server.logs.level = value;
        }
        Ok(())
    }

    /// Check that enabled features have what they need.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.enable && self.auth.oidc_provider.base_url.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.oidc_provider.base_url is required when auth is enabled".into(),
            ));
        }
        if self.routing.enable {
            if self.routing.optimization.host.is_empty() {
                return Err(ConfigError::Invalid(
                    "routing.optimization.host is required when routing is enabled".into(),
                ));
            }
            if self.routing.provider_host().is_empty() {
                return Err(ConfigError::Invalid(
                    "a host for the selected routing provider is required".into(),
                ));
            }
        }
        if self.mqtt.enable && self.mqtt.topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt.topic must not be empty".into()));
        }
        if self.sensor.nearest_tree_radius < 0.0 {
            return Err(ConfigError::Invalid(
                "sensor.nearest_tree_radius must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Settings for the domain services.
    #[must_use]
    pub fn control(&self) -> ControlConfig {
        ControlConfig {
            nearest_tree_radius_m: self.sensor.nearest_tree_radius,
            plugin_interval_seconds: self.scheduler.plugin_interval_seconds,
            plugin_timeout_seconds: self.scheduler.plugin_timeout_seconds,
        }
    }
}
