//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//! - Secure connection string storage via [`SecretString`]
//!
//! # Example
//!
//! ```
//! use db_guard::config::{Config, SecretString};
//!
//! // Use Config::from_env() in production
//! let config = Config {
//!     database_url: SecretString::new("postgres://app:hunter2@db/shop"),
//!     ..Config::default()
//! };
//!
//! assert_eq!(config.retry_policy().max_attempts, 3);
//! // The connection string is protected from accidental logging
//! let debug = format!("{:?}", config);
//! assert!(debug.contains("<REDACTED>"));
//! assert!(!debug.contains("hunter2"));
//! ```

mod secret;
mod validation;

pub use secret::SecretString;
pub use validation::{
    validate_config, MAX_ATTEMPTS, MAX_FAILURE_THRESHOLD, MAX_HISTORY_RETENTION,
    MAX_RECOVERY_TIMEOUT_MS, MAX_RETRY_DELAY_MS, MIN_PROBE_INTERVAL_MS, MIN_RECOVERY_TIMEOUT_MS,
};

use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::error::ConfigError;
use crate::retry::{Backoff, RetryPolicy};

/// Default database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";

/// Default database alias.
pub const DEFAULT_DATABASE_ALIAS: &str = "default";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default consecutive failures before a breaker trips.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default recovery timeout in milliseconds.
pub const DEFAULT_RECOVERY_TIMEOUT_MS: u64 = 30_000;

/// Default maximum attempts per guarded call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Default cap on a single retry delay in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5_000;

/// Default number of error records kept.
pub const DEFAULT_HISTORY_RETENTION: usize = 1_000;

/// Default statistics window in seconds.
pub const DEFAULT_STATS_WINDOW_SECS: u64 = 3_600;

/// Default probe interval in milliseconds.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 5_000;

/// Application configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
/// The `database_url` field uses [`SecretString`] to prevent accidental logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database connection string.
    pub database_url: SecretString,
    /// Alias the database is known by; one breaker per alias.
    pub database_alias: String,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Consecutive failures before a breaker trips.
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is admitted.
    pub recovery_timeout_ms: u64,
    /// Maximum attempts per guarded call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub retry_base_delay_ms: u64,
    /// Cap on a single retry delay.
    pub retry_max_delay_ms: u64,
    /// Delay growth between retries.
    pub retry_backoff: Backoff,
    /// Number of error records kept in memory.
    pub history_retention: usize,
    /// Window used for error statistics.
    pub stats_window_secs: u64,
    /// Interval between liveness probes in the binary.
    pub probe_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: SecretString::new(DEFAULT_DATABASE_URL),
            database_alias: DEFAULT_DATABASE_ALIAS.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout_ms: DEFAULT_RECOVERY_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            retry_backoff: Backoff::Exponential,
            history_retention: DEFAULT_HISTORY_RETENTION,
            stats_window_secs: DEFAULT_STATS_WINDOW_SECS,
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `DATABASE_URL` (default: `sqlite::memory:`)
    /// - `DATABASE_ALIAS` (default: `default`)
    /// - `LOG_LEVEL` (default: `info`)
    /// - `FAILURE_THRESHOLD` (default: `5`)
    /// - `RECOVERY_TIMEOUT_MS` (default: `30000`)
    /// - `MAX_ATTEMPTS` (default: `3`)
    /// - `RETRY_BASE_DELAY_MS` (default: `100`)
    /// - `RETRY_MAX_DELAY_MS` (default: `5000`)
    /// - `RETRY_BACKOFF` (`fixed` or `exponential`, default: `exponential`)
    /// - `HISTORY_RETENTION` (default: `1000`)
    /// - `STATS_WINDOW_SECS` (default: `3600`)
    /// - `PROBE_INTERVAL_MS` (default: `5000`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value does not parse or fails
    /// [`validate_config`].
    #[must_use = "configuration should be used"]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let retry_backoff = match std::env::var("RETRY_BACKOFF") {
            Ok(val) => val.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "RETRY_BACKOFF".into(),
                reason,
            })?,
            Err(_) => Backoff::Exponential,
        };

        let config = Self {
            database_url: SecretString::new(env_or("DATABASE_URL", DEFAULT_DATABASE_URL)),
            database_alias: env_or("DATABASE_ALIAS", DEFAULT_DATABASE_ALIAS),
            log_level: env_or("LOG_LEVEL", DEFAULT_LOG_LEVEL),
            failure_threshold: parse_env("FAILURE_THRESHOLD", DEFAULT_FAILURE_THRESHOLD)?,
            recovery_timeout_ms: parse_env("RECOVERY_TIMEOUT_MS", DEFAULT_RECOVERY_TIMEOUT_MS)?,
            max_attempts: parse_env("MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            retry_base_delay_ms: parse_env("RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS)?,
            retry_max_delay_ms: parse_env("RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS)?,
            retry_backoff,
            history_retention: parse_env("HISTORY_RETENTION", DEFAULT_HISTORY_RETENTION)?,
            stats_window_secs: parse_env("STATS_WINDOW_SECS", DEFAULT_STATS_WINDOW_SECS)?,
            probe_interval_ms: parse_env("PROBE_INTERVAL_MS", DEFAULT_PROBE_INTERVAL_MS)?,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Breaker settings derived from this configuration.
    #[must_use]
    pub const fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
        }
    }

    /// Retry policy derived from this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff: self.retry_backoff,
        }
    }

    /// Statistics window.
    #[must_use]
    pub const fn stats_window(&self) -> Duration {
        Duration::from_secs(self.stats_window_secs)
    }

    /// Probe interval.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.into())
}

/// Parse an environment variable, using a default if not set.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a non-negative integer".into(),
        })
    })
}
