//! Application configuration

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::TrackerError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Where users, sessions and voyages are kept
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Postgres,
    /// Process memory; needs the `memory` feature and loses everything on exit
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Lifetime of an access token
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub ttl: Duration,
    /// Lifetime of a password reset token
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub reset_token_ttl: Duration,
    /// How often expired sessions and reset tokens are purged
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: Duration,
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(300)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            reset_token_ttl: Duration::from_secs(3600),
            sweep_interval: default_sweep_interval(),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// How long a cached list may be served before it is fetched again
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    /// Load configuration from the given file (any extension `config` knows),
    /// with environment variables taking precedence.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("VOYAGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins"),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        self.database.validate()?;
        self.session.validate()?;
        if self.cache.ttl.is_zero() {
            return Err(TrackerError::ConfigurationError {
                message: "Cache TTL must be greater than zero".to_string(),
            });
        }
        if self.server.bind.trim().is_empty() {
            return Err(TrackerError::ConfigurationError {
                message: "Bind address cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.backend == BackendKind::Memory {
            if !cfg!(any(test, feature = "memory")) {
                return Err(TrackerError::ConfigurationError {
                    message: "In-memory backend requires the `memory` feature".to_string(),
                });
            }
            return Ok(());
        }
        if self.url.trim().is_empty() {
            return Err(TrackerError::ConfigurationError {
                message: "Database URL cannot be empty".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(TrackerError::ConfigurationError {
                message: "Database pool needs at least one connection".to_string(),
            });
        }
        Ok(())
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), TrackerError> {
        if self.ttl.is_zero() || self.reset_token_ttl.is_zero() || self.sweep_interval.is_zero()
        {
            return Err(TrackerError::ConfigurationError {
                message: "Session lifetimes must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Load a `.env` file from `dir` if one exists.
#[cfg(feature = "dotenv")]
pub fn load_dotenv(dir: &Path) {
    match dotenvy::from_path(dir.join(".env")) {
        Ok(()) => tracing::info!("Loaded environment from {}", dir.join(".env").display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Could not read .env file: {}", e),
    }
}

#[cfg(not(feature = "dotenv"))]
pub fn load_dotenv(_dir: &Path) {}
