//! Configuration management for the POS inventory server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with POS__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration for staff sessions
    pub jwt: JwtConfig,

    /// Supplier confirmation link configuration
    pub confirmation: ConfirmationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
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
pub struct JwtConfig {
    /// Secret key used to verify staff JWTs
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfirmationConfig {
    /// HMAC key for supplier confirmation tokens
    pub secret: String,

    /// Lifetime of a confirmation link in days
    pub ttl_days: i64,

    /// Public base URL the supplier links point at
    pub base_url: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("POS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("confirmation.ttl_days", shared::DEFAULT_TOKEN_TTL_DAYS)?
            .set_default("confirmation.base_url", "http://localhost:3000")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (POS__ prefix)
            .add_source(
                Environment::with_prefix("POS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmation.secret.len() < 32 {
            return Err(ConfigError::Message(
                "confirmation.secret must be at least 32 bytes".to_string(),
            ));
        }
        shared::validate_ttl_days(self.confirmation.ttl_days)
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(())
    }
}
