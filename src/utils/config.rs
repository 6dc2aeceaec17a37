use crate::core::{Position, DEFAULT_MIN_BATCH_SIZE};
use crate::hardware::LightSensorConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default location of the node's configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/home/pi/.config/flux-config.json";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:9000";

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Login credentials for the Flux server
    pub credentials: Credentials,
    /// Timing of server communication
    pub connection: ConnectionConfig,
    /// Candidate server base URLs, probed in order
    pub server_urls: Vec<String>,
    /// Batching and sampling of readings
    pub measurement: MeasurementConfig,
    /// Passed unchanged to the light sensor driver
    pub light_sensor: LightSensorConfig,
    /// Parameters of the simulated sensors
    pub simulation: SimulationConfig,
}

/// Username and password for the login route
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Server communication timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long each candidate URL is probed during discovery (seconds)
    pub timeout_secs: u64,
    /// Pause between polling attempts (milliseconds)
    pub poll_step_ms: u64,
    /// Pause before restarting discovery after a failed session (milliseconds)
    pub retry_delay_ms: u64,
    /// Timeout of a single HTTP request (seconds)
    pub request_timeout_secs: u64,
}

/// Batching and sampling of readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Readings accumulated before a batch is sent
    pub min_batch_size: usize,
    /// Pause between measurement cycles (milliseconds)
    pub cycle_interval_ms: u64,
}

/// Simulated sensor output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub position: Position,
    pub position_jitter: f64,
    pub lux: f64,
    pub lux_jitter: f64,
    /// Chance of a transient positioning fault per measurement
    pub fault_probability: f32,
}

/// Configuration loading and validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read config file '{path}': {details}")]
    Io { path: String, details: String },
    /// Configuration file is not valid JSON for this schema
    #[error("failed to parse config file '{path}': {details}")]
    Serialization { path: String, details: String },
    /// Parameter outside its valid range
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter { parameter: String, value: String, reason: String },
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: "user".to_string(),
            password: "secret".to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value for HTTP basic authentication
    pub fn basic_auth(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", encoded)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            poll_step_ms: 2000,
            retry_delay_ms: 3000,
            request_timeout_secs: 10,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_step(&self) -> Duration {
        Duration::from_millis(self.poll_step_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            cycle_interval_ms: 0,
        }
    }
}

impl MeasurementConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            position: Position::new(1000.0, 2000.0, 1000.0),
            position_jitter: 50.0,
            lux: 350.0,
            lux_jitter: 15.0,
            fault_probability: 0.0,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!(path = %path_str, "loading config file");

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path_str.clone(),
            details: e.to_string(),
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| ConfigError::Serialization {
            path: path_str.clone(),
            details: e.to_string(),
        })?;

        config.fill_server_urls();
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing or broken
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "using default configuration");
                let mut config = Config::default();
                config.fill_server_urls();
                config
            }
        }
    }

    fn fill_server_urls(&mut self) {
        self.server_urls.retain(|url| !url.trim().is_empty());
        if self.server_urls.is_empty() {
            warn!(url = DEFAULT_SERVER_URL, "no server URLs configured, using default");
            self.server_urls.push(DEFAULT_SERVER_URL.to_string());
        }
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.measurement.min_batch_size == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "measurement.min_batch_size".to_string(),
                value: "0".to_string(),
                reason: "at least one reading per batch is required".to_string(),
            });
        }
        if self.connection.poll_step_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "connection.poll_step_ms".to_string(),
                value: "0".to_string(),
                reason: "polling needs a pause between attempts".to_string(),
            });
        }
        if let Some(url) = self
            .server_urls
            .iter()
            .find(|url| !(url.starts_with("http://") || url.starts_with("https://")))
        {
            return Err(ConfigError::InvalidParameter {
                parameter: "server_urls".to_string(),
                value: url.clone(),
                reason: "server URLs must start with http:// or https://".to_string(),
            });
        }
        self.light_sensor.validate().map_err(|e| ConfigError::InvalidParameter {
            parameter: "light_sensor.i2c_address".to_string(),
            value: format!("0x{:02X}", self.light_sensor.i2c_address),
            reason: e.to_string(),
        })
    }

    pub fn server_urls(&self) -> &[String] {
        &self.server_urls
    }

    /// Discovery timeout per candidate URL
    pub fn timeout(&self) -> Duration {
        self.connection.timeout()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
