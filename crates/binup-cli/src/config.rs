//! Configuration file handling for binup

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use binup_transport::{TransportConfig, DEFAULT_FILE_FIELD};
use serde::{Deserialize, Serialize};

/// Defaults read from `binup/config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Base URL for relative actions
    pub base_url: Option<String>,
    /// Default HTTP method
    pub method: Option<String>,
    /// Default multipart field name for the file
    pub file_field: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Headers sent with every upload
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("binup");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        method: Option<&str>,
        file_field: Option<&str>,
        timeout_ms: Option<u64>,
    ) -> MergedConfig {
        let mut transport = TransportConfig::builder();
        if let Some(base) = &self.base_url {
            transport = transport.base_url(base.clone());
        }
        if let Some(ms) = timeout_ms.or(self.timeout_ms) {
            transport = transport.request_timeout_ms(ms);
        }
        for (name, value) in &self.headers {
            transport = transport.default_header(name.clone(), value.clone());
        }

        MergedConfig {
            method: method
                .map(String::from)
                .or_else(|| self.method.clone())
                .unwrap_or_else(|| "POST".to_string())
                .to_uppercase(),
            file_field: file_field
                .map(String::from)
                .or_else(|| self.file_field.clone())
                .unwrap_or_else(|| DEFAULT_FILE_FIELD.to_string()),
            transport: transport.build(),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub method: String,
    pub file_field: String,
    pub transport: TransportConfig,
}
