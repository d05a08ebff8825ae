//! Application configuration
//!
//! Everything is read from environment variables with working local
//! defaults, then validated once at startup.

use serde::{Deserialize, Serialize};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration for the job ledger.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub mongo: MongoConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load and validate configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            mongo: MongoConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        self.mongo.validate()?;
        Ok(())
    }
}

/// MongoDB connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MongoConfig {
    /// Connection URL
    pub url: String,

    /// Database name
    pub database: String,

    /// Connection and server-selection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl MongoConfig {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("JOBLEDGER_MONGO_URL")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let database =
            std::env::var("JOBLEDGER_MONGO_DATABASE").unwrap_or_else(|_| "jobledger".to_string());

        let connect_timeout_ms = std::env::var("JOBLEDGER_MONGO_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("JOBLEDGER_MONGO_TIMEOUT_MS".to_string()))?;

        Ok(Self {
            url,
            database,
            connect_timeout_ms,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("mongodb://") && !self.url.starts_with("mongodb+srv://") {
            return Err(ConfigError::InvalidValue(
                "MongoDB URL must start with mongodb:// or mongodb+srv://".to_string(),
            ));
        }
        if self.database.is_empty() {
            return Err(ConfigError::InvalidValue(
                "database name must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "connect_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter, `RUST_LOG` syntax
    pub level: String,

    /// Log format: "json" or "pretty"
    pub format: String,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        let level = std::env::var("JOBLEDGER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let format = std::env::var("JOBLEDGER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        Ok(Self { level, format })
    }
}
