//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::events::RetryPolicy;
use crate::ledger::LedgerOptions;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used without one
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub log_format: LogFormat,

    /// Base URL events are POSTed to; events are only logged without one
    pub event_sink_url: Option<String>,

    pub event_publish_max_attempts: u32,

    pub event_publish_base_delay_ms: u64,

    pub event_publish_timeout_ms: u64,

    /// Currency code reported with balances
    pub ledger_currency: String,

    /// Record a TRANSFER-RECEIVED entry for transfer receivers
    pub ledger_symmetric_history: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let or_default = |key: &str, default: &str| optional(key).unwrap_or_else(|| default.to_string());

        let log_format = match or_default("LOG_FORMAT", "text").to_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            _ => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            database_max_connections: parse(
                "DATABASE_MAX_CONNECTIONS",
                &or_default("DATABASE_MAX_CONNECTIONS", "10"),
            )?,
            host: or_default("HOST", "127.0.0.1"),
            port: parse("PORT", &or_default("PORT", "3000"))?,
            environment: or_default("ENVIRONMENT", "development"),
            log_format,
            event_sink_url: optional("EVENT_SINK_URL"),
            event_publish_max_attempts: parse(
                "EVENT_PUBLISH_MAX_ATTEMPTS",
                &or_default("EVENT_PUBLISH_MAX_ATTEMPTS", "3"),
            )?,
            event_publish_base_delay_ms: parse(
                "EVENT_PUBLISH_BASE_DELAY_MS",
                &or_default("EVENT_PUBLISH_BASE_DELAY_MS", "500"),
            )?,
            event_publish_timeout_ms: parse(
                "EVENT_PUBLISH_TIMEOUT_MS",
                &or_default("EVENT_PUBLISH_TIMEOUT_MS", "5000"),
            )?,
            ledger_currency: or_default("LEDGER_CURRENCY", "BRL"),
            ledger_symmetric_history: parse_bool(
                "LEDGER_SYMMETRIC_HISTORY",
                &or_default("LEDGER_SYMMETRIC_HISTORY", "false"),
            )?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.event_publish_max_attempts,
            Duration::from_millis(self.event_publish_base_delay_ms),
        )
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.event_publish_timeout_ms)
    }

    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            currency: self.ledger_currency.clone(),
            symmetric_history: self.ledger_symmetric_history,
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key)),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.event_sink_url.is_none());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.publish_timeout(), Duration::from_secs(5));
        assert_eq!(config.ledger_options(), LedgerOptions::default());
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/ledger"),
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("EVENT_SINK_URL", "http://events:9000"),
            ("EVENT_PUBLISH_MAX_ATTEMPTS", "5"),
            ("LEDGER_CURRENCY", "USD"),
            ("LEDGER_SYMMETRIC_HISTORY", "true"),
            ("ENVIRONMENT", "production"),
        ])
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/ledger"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.event_sink_url.as_deref(), Some("http://events:9000"));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.ledger_options().currency, "USD");
        assert!(config.ledger_options().symmetric_history);
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_blank_database_url_is_absent() {
        let config = config_from(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("PORT", "http")]),
            Err(ConfigError::InvalidValue("PORT"))
        ));
        assert!(matches!(
            config_from(&[("LEDGER_SYMMETRIC_HISTORY", "maybe")]),
            Err(ConfigError::InvalidValue("LEDGER_SYMMETRIC_HISTORY"))
        ));
        assert!(matches!(
            config_from(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::InvalidValue("LOG_FORMAT"))
        ));
    }
}
