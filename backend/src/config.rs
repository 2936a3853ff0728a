//! Configuration management for the parts inventory engine
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with PARTS_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Stock ledger behaviour
    pub ledger: LedgerConfig,

    /// Low-stock alert settings
    pub alerts: AlertConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Attempts per operation when a concurrent update conflict is detected
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    /// Seconds between full low-stock reconciliation sweeps
    pub sweep_interval_secs: u64,

    /// Buffered low-stock events per subscriber
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("PARTS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("ledger.max_attempts", 3)?
            .set_default("alerts.sweep_interval_secs", 3600)?
            .set_default("alerts.channel_capacity", 256)?
            .set_default("logging.json", false)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (PARTS_ prefix)
            .add_source(
                Environment::with_prefix("PARTS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 3600,
            channel_capacity: 256,
        }
    }
}
