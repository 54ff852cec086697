//! Configuration management for the rsent server.
//!
//! Configuration is layered from three sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! Environment variables take precedence over config file values, which take
//! precedence over defaults. Variables are prefixed with `RSENT_` and use
//! `__` as the nested key separator, e.g. `RSENT_STORAGE__DATABASE_URL`
//! overrides `storage.database_url`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Entitlements policy settings
    #[serde(default)]
    pub entitlements: EntitlementsSettings,
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "postgres". Selected once at
    /// process start.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "postgres")
    pub database_url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    30
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Tenancy and policy settings of the entitlements domain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EntitlementsSettings {
    /// Base DNS domain; partition group emails live under
    /// `<partition>.<domain>`.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// The deployment's service account, protected from removal.
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Path to the protected-members JSON document, if any.
    pub protected_members_file: Option<String>,

    /// Maximum number of groups any identity may belong to.
    #[serde(default = "default_max_parents")]
    pub max_parents: usize,

    /// Maximum number of data groups under a partition's data root.
    #[serde(default = "default_max_parents")]
    pub data_root_quota: usize,
}

impl Default for EntitlementsSettings {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            service_account: default_service_account(),
            protected_members_file: None,
            max_parents: default_max_parents(),
            data_root_quota: default_max_parents(),
        }
    }
}

fn default_domain() -> String {
    "contoso.com".to_string()
}

fn default_service_account() -> String {
    "entitlements-admin@contoso.com".to_string()
}

fn default_max_parents() -> usize {
    rsent_storage::MAX_PARENTS
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("RSENT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(
                Environment::with_prefix("RSENT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["memory", "postgres"];
        if !valid_backends.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    valid_backends, self.storage.backend
                ),
            });
        }

        if self.storage.backend == "postgres"
            && self
                .storage
                .database_url
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigLoadError::Invalid {
                message: "storage.database_url is required when backend is 'postgres'"
                    .to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        if self.entitlements.domain.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "entitlements.domain must not be empty".to_string(),
            });
        }
        if !self.entitlements.service_account.contains('@') {
            return Err(ConfigLoadError::Invalid {
                message: "entitlements.service_account must be an email".to_string(),
            });
        }
        if self.entitlements.max_parents == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "entitlements.max_parents must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}
