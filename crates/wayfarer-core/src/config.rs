//! Transport configuration
//!
//! Values are resolved in this order, later sources winning:
//! - Default values
//! - A YAML or JSON configuration file
//! - Environment variables (after loading a `.env` file)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::classifier::ClassifierConfig;
use crate::http::retry::RetryPolicy;
use crate::logging::LoggingConfig;
use crate::{Error, Result};

/// Gateway address override
pub const ENV_API_BASE: &str = "WAYFARER_API_BASE";
/// Comma-separated direct backend addresses
pub const ENV_DIRECT_BASES: &str = "WAYFARER_DIRECT_BASES";
pub const ENV_TIMEOUT_SECS: &str = "WAYFARER_TIMEOUT_SECS";
pub const ENV_STORAGE_PATH: &str = "WAYFARER_STORAGE_PATH";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Gateway or reverse proxy every call goes to first
    pub primary_base: String,

    /// Direct backend addresses, in probing order, used by discovery
    pub direct_bases: Vec<String>,

    /// Path of the resource collection
    pub collection_path: String,

    /// Transport timeout in seconds
    pub timeout_secs: u64,

    /// Retry settings for listing calls
    pub retry: RetryPolicy,

    /// Public/protected endpoint rules
    pub classifier: ClassifierConfig,

    /// Persistence settings
    pub storage: StorageConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Where credentials and the endpoint cache live
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file backing the key-value store; in-memory when unset
    pub path: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            primary_base: "http://localhost/api".to_string(),
            direct_bases: vec!["http://localhost:8080".to_string()],
            collection_path: "/posts".to_string(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            classifier: ClassifierConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let extension = path.extension().and_then(|s| s.to_str());
        let config = if extension == Some("yaml") || extension == Some("yml") {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        debug!(path = %path.display(), "Loaded transport configuration");
        Ok(config)
    }

    /// Full resolution: defaults or `file`, then `.env` and the process environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }

        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.logging.merge_with_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `WAYFARER_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_API_BASE) {
            self.primary_base = base.trim().to_string();
        }

        if let Some(bases) = lookup(ENV_DIRECT_BASES) {
            self.direct_bases = bases
                .split(',')
                .map(str::trim)
                .filter(|base| !base.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            self.timeout_secs = timeout.trim().parse().map_err(|e| {
                Error::config(format!("{} must be a number of seconds: {}", ENV_TIMEOUT_SECS, e))
            })?;
        }

        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            self.storage.path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Reject unusable addresses and timeouts
    pub fn validate(&self) -> Result<()> {
        validate_base("primary_base", &self.primary_base)?;
        for base in &self.direct_bases {
            validate_base("direct_bases", base)?;
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be greater than zero"));
        }
        if !self.collection_path.starts_with('/') {
            return Err(Error::config(format!(
                "collection_path must start with '/': {}",
                self.collection_path
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let extension = path.extension().and_then(|s| s.to_str());
        let content = if extension == Some("yaml") || extension == Some("yml") {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

fn validate_base(field: &str, base: &str) -> Result<()> {
    if base.trim().is_empty() {
        return Err(Error::config(format!("{} must not be empty", field)));
    }
    let parsed = url::Url::parse(base)
        .map_err(|e| Error::config(format!("{} is not a valid URL ({}): {}", field, base, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::config(format!(
            "{} must use http or https: {}",
            field, base
        )));
    }
    Ok(())
}
