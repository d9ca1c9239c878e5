//! Configuration loading for a rowcache instance.
//!
//! Table and primary key are required. Cache TTL defaults to one day and
//! caching defaults to enabled.

use crate::error::ConfigError;
use crate::TableBinding;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file used by [`RowcacheConfig::load`].
pub const CONFIG_PATH_ENV: &str = "ROWCACHE_CONFIG";

/// Default cache entry lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RowcacheConfig {
    pub table: TableSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSettings {
    pub name: String,
    pub primary_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Cache servers, in order. Keys are sharded across them.
    #[serde(default)]
    pub endpoints: Vec<CacheEndpoint>,
    /// Entry lifetime in seconds; 0 never expires.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            ttl_secs: DEFAULT_TTL_SECS,
            enabled: true,
        }
    }
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_enabled() -> bool {
    true
}

/// A single cache server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheEndpoint {
    pub host: String,
    pub port: u16,
}

impl CacheEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for CacheEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl RowcacheConfig {
    /// Load from the file named by `ROWCACHE_CONFIG` and validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingRequired {
                field: CONFIG_PATH_ENV.to_string(),
            })?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table_binding().validate()?;
        for (i, endpoint) in self.cache.endpoints.iter().enumerate() {
            if endpoint.host.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("cache.endpoints[{}].host", i),
                    reason: "must not be empty".to_string(),
                });
            }
            if endpoint.port == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("cache.endpoints[{}].port", i),
                    reason: "must be > 0".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn table_binding(&self) -> TableBinding {
        TableBinding::new(self.table.name.clone(), self.table.primary_key.clone())
    }
}
