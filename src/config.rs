use crate::error::{Result, TrackerError};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub geocoding: GeocodingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Settings for the external geocoding providers. The user agent is required:
/// Nominatim rejects or throttles anonymous clients.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default = "default_nominatim_endpoint")]
    pub nominatim_endpoint: String,
    #[serde(default = "default_viacep_endpoint")]
    pub viacep_endpoint: String,
    pub user_agent: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_nominatim_endpoint() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_viacep_endpoint() -> String {
    "https://viacep.com.br".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_cache_dir() -> String {
    "data/geocode_cache".to_string()
}

fn default_db_path() -> String {
    "data/tracker.db".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            TrackerError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;

        let config: Config = toml::from_str(&content)?;
        if config.geocoding.user_agent.trim().is_empty() {
            return Err(TrackerError::Config(
                "geocoding.user_agent must not be empty".to_string(),
            ));
        }
        Ok(config)
    }
}
