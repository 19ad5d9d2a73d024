//! Transport configuration with YAML support

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upload transport configuration
///
/// Can be loaded from YAML, JSON, or constructed programmatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Base URL that relative upload actions are resolved against
    #[serde(default)]
    pub base_url: Option<String>,

    /// Timeout settings (unbounded when absent)
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Headers sent with every upload
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeouts: TimeoutsConfig::default(),
            default_headers: BTreeMap::new(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("binup/{}", env!("CARGO_PKG_VERSION"))
}

/// Timeout configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Whole-request timeout in milliseconds
    #[serde(default)]
    pub request_ms: Option<u64>,

    /// Connect timeout in milliseconds
    #[serde(default)]
    pub connect_ms: Option<u64>,
}

impl TimeoutsConfig {
    pub fn request(&self) -> Option<Duration> {
        self.request_ms.map(Duration::from_millis)
    }

    pub fn connect(&self) -> Option<Duration> {
        self.connect_ms.map(Duration::from_millis)
    }
}

impl TransportConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for TransportConfig
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the base URL for relative actions
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set request timeout in milliseconds
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.request_ms = Some(ms);
        self
    }

    /// Set connect timeout in milliseconds
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeouts.connect_ms = Some(ms);
        self
    }

    /// Add a header sent with every upload
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .default_headers
            .insert(name.into(), value.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
