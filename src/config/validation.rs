//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::Config;
use crate::error::ConfigError;

/// Maximum allowed failure threshold.
pub const MAX_FAILURE_THRESHOLD: u32 = 100;

/// Minimum allowed recovery timeout in milliseconds.
pub const MIN_RECOVERY_TIMEOUT_MS: u64 = 100;

/// Maximum allowed recovery timeout in milliseconds (1 hour).
pub const MAX_RECOVERY_TIMEOUT_MS: u64 = 3_600_000;

/// Maximum allowed attempts per call.
pub const MAX_ATTEMPTS: u32 = 10;

/// Maximum allowed single retry delay in milliseconds.
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Maximum allowed history retention.
pub const MAX_HISTORY_RETENTION: usize = 100_000;

/// Minimum allowed probe interval in milliseconds.
pub const MIN_PROBE_INTERVAL_MS: u64 = 100;

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.into(),
        reason: reason.into(),
    }
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `DATABASE_URL` and `DATABASE_ALIAS` must not be empty
/// - `FAILURE_THRESHOLD` must be between 1 and 100
/// - `RECOVERY_TIMEOUT_MS` must be between 100 and 3600000
/// - `MAX_ATTEMPTS` must be between 1 and 10
/// - `RETRY_MAX_DELAY_MS` must not exceed 60000
/// - `RETRY_BASE_DELAY_MS` must not exceed `RETRY_MAX_DELAY_MS`
/// - `HISTORY_RETENTION` must be between 1 and 100000
/// - `STATS_WINDOW_SECS` must be positive
/// - `PROBE_INTERVAL_MS` must be at least 100
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.database_url.is_empty() {
        return Err(invalid("DATABASE_URL", "must not be empty"));
    }

    if config.database_alias.trim().is_empty() {
        return Err(invalid("DATABASE_ALIAS", "must not be empty"));
    }

    if config.failure_threshold == 0 || config.failure_threshold > MAX_FAILURE_THRESHOLD {
        return Err(invalid(
            "FAILURE_THRESHOLD",
            format!("must be between 1 and {MAX_FAILURE_THRESHOLD}"),
        ));
    }

    if !(MIN_RECOVERY_TIMEOUT_MS..=MAX_RECOVERY_TIMEOUT_MS).contains(&config.recovery_timeout_ms) {
        return Err(invalid(
            "RECOVERY_TIMEOUT_MS",
            format!("must be between {MIN_RECOVERY_TIMEOUT_MS} and {MAX_RECOVERY_TIMEOUT_MS} ms"),
        ));
    }

    if config.max_attempts == 0 || config.max_attempts > MAX_ATTEMPTS {
        return Err(invalid(
            "MAX_ATTEMPTS",
            format!("must be between 1 and {MAX_ATTEMPTS}"),
        ));
    }

    if config.retry_max_delay_ms > MAX_RETRY_DELAY_MS {
        return Err(invalid(
            "RETRY_MAX_DELAY_MS",
            format!("must not exceed {MAX_RETRY_DELAY_MS} ms"),
        ));
    }

    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(invalid(
            "RETRY_BASE_DELAY_MS",
            "must not exceed RETRY_MAX_DELAY_MS",
        ));
    }

    if config.history_retention == 0 || config.history_retention > MAX_HISTORY_RETENTION {
        return Err(invalid(
            "HISTORY_RETENTION",
            format!("must be between 1 and {MAX_HISTORY_RETENTION}"),
        ));
    }

    if config.stats_window_secs == 0 {
        return Err(invalid("STATS_WINDOW_SECS", "must be positive"));
    }

    if config.probe_interval_ms < MIN_PROBE_INTERVAL_MS {
        return Err(invalid(
            "PROBE_INTERVAL_MS",
            format!("must be at least {MIN_PROBE_INTERVAL_MS} ms"),
        ));
    }

    Ok(())
}
