//! Error types for the database guard.
//!
//! This module defines a hierarchical error system:
//! - [`DbError`]: Failures reported by a database adapter, tagged at the call site
//! - [`GuardError`]: Failures returned by the guarded execution wrappers
//! - [`ConfigError`]: Configuration errors
//! - [`AppError`]: Top-level application errors
//!
//! All errors implement `Send + Sync`.

use thiserror::Error;

use crate::classify::Classification;

/// Top-level application error.
///
/// Returned by the probe binary and by startup code that both loads
/// configuration and talks to the database.
#[derive(Debug, Error)]
pub enum AppError {
    /// Guarded operation error.
    #[error("Guarded operation error: {0}")]
    Guard(#[from] GuardError),

    /// Database error raised outside a guarded call.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A failed database operation, tagged by the adapter that observed it.
///
/// Adapters pick the variant from the driver's structured error where they
/// can; [`DbError::Other`] carries failures that could not be tagged and is
/// classified from its message instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The server actively refused the connection.
    #[error("Connection refused: {message}")]
    ConnectionRefused {
        /// Driver message.
        message: String,
    },

    /// An established connection was dropped or reset.
    #[error("Connection lost: {message}")]
    ConnectionLost {
        /// Driver message.
        message: String,
    },

    /// The operation did not complete in time.
    #[error("Operation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },

    /// A lock could not be acquired (deadlock, busy database).
    #[error("Lock contention: {message}")]
    LockContention {
        /// Driver message.
        message: String,
    },

    /// A constraint rejected the write.
    #[error("Integrity violation: {message}")]
    IntegrityViolation {
        /// Name of the violated constraint, when the driver reports one.
        constraint: Option<String>,
        /// Driver message.
        message: String,
    },

    /// The connection is not allowed to perform the operation.
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Driver message.
        message: String,
    },

    /// The statement itself is invalid (syntax, unknown table or column).
    #[error("Invalid query: {message}")]
    InvalidQuery {
        /// Driver message.
        message: String,
    },

    /// The server ran out of a resource (connections, memory, disk).
    #[error("Resource exhausted: {message}")]
    ResourceExhausted {
        /// Driver message.
        message: String,
    },

    /// A failure the adapter could not tag.
    #[error("{message}")]
    Other {
        /// Raw error message.
        message: String,
    },
}

impl DbError {
    /// Shorthand for an untagged error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors returned by the guarded execution wrappers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// The breaker for the database rejected the call before it ran.
    #[error("Circuit open for database {database}: retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// Database alias whose breaker is open.
        database: String,
        /// Milliseconds until the breaker admits a probe.
        retry_after_ms: u64,
    },

    /// The operation failed; carries the last error and the attempts made.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Operation {
        /// Operation name.
        operation: String,
        /// Number of attempts actually invoked.
        attempts: u32,
        /// Classification of the last error.
        classification: Classification,
        /// The last error returned by the operation.
        #[source]
        source: DbError,
    },
}

impl GuardError {
    /// Number of times the wrapped operation was invoked.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::CircuitOpen { .. } => 0,
            Self::Operation { attempts, .. } => *attempts,
        }
    }

    /// The underlying database error, if the operation ran at all.
    #[must_use]
    pub const fn db_error(&self) -> Option<&DbError> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::Operation { source, .. } => Some(source),
        }
    }

    /// Generic text safe to show to end users; details stay in the logs.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "The service is temporarily unavailable. Please try again shortly.",
            Self::Operation { .. } => "The request could not be completed. Please try again later.",
        }
    }
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}
