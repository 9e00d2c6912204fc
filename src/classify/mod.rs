//! Error classification.
//!
//! This module provides:
//! - Categorization of database failures for logging and statistics
//! - Severity and recoverability assignment
//! - A suggested recovery strategy used by the retry wrapper
//!
//! Tagged [`DbError`] variants map through a fixed table. Untagged errors
//! ([`DbError::Other`]) fall back to the ordered message rules in
//! [`rules::MESSAGE_RULES`]. Classification never performs I/O and always
//! returns the same answer for the same input.
//!
//! # Example
//!
//! ```
//! use db_guard::classify::{ErrorCategory, ErrorClassifier, Severity};
//! use db_guard::error::DbError;
//!
//! let classifier = ErrorClassifier::new();
//! let c = classifier.classify(&DbError::other("could not connect: Connection refused"));
//! assert_eq!(c.category, ErrorCategory::Network);
//! assert_eq!(c.severity, Severity::Critical);
//! assert!(c.recoverable);
//! ```

pub mod rules;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DbError;

/// Category of a database failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connection could not be established or was lost.
    Network,
    /// Operation exceeded its deadline.
    Timeout,
    /// Lock contention or serialization failure.
    Concurrency,
    /// Constraint violation.
    Integrity,
    /// Authorization or read-only failure.
    Permission,
    /// Invalid statement.
    Query,
    /// Server-side resource exhaustion.
    Resource,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Concurrency => "concurrency",
            Self::Integrity => "integrity",
            Self::Permission => "permission",
            Self::Query => "query",
            Self::Resource => "resource",
            Self::Unknown => "unknown",
        }
    }

    /// Whether failures of this category are transient.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Concurrency | Self::Resource
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a database failure, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; no action needed.
    Low,
    /// Degraded request, likely transient.
    Medium,
    /// Request failed and needs attention.
    High,
    /// The database is unusable.
    Critical,
}

impl Severity {
    /// Stable lowercase name, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggested recovery for a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Retry after a delay.
    Retry,
    /// Retry, but expect the breaker to open soon.
    CircuitBreak,
    /// Give up immediately.
    FailFast,
}

/// Where a failure happened, for log context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Layer that observed the failure (e.g. `database`, `cache`).
    pub layer: String,
    /// Component within the layer (e.g. `orders`).
    pub component: String,
    /// Operation name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Database alias.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl ErrorContext {
    /// Create a context for a layer and component.
    #[must_use]
    pub fn new(layer: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            component: component.into(),
            operation: None,
            database: None,
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Set the database alias.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

/// Result of classifying one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Failure category.
    pub category: ErrorCategory,
    /// Failure severity.
    pub severity: Severity,
    /// Whether retrying may succeed.
    pub recoverable: bool,
    /// Suggested recovery.
    pub strategy: RecoveryStrategy,
}

impl Classification {
    const fn new(category: ErrorCategory, severity: Severity, strategy: RecoveryStrategy) -> Self {
        Self {
            category,
            severity,
            recoverable: category.is_transient(),
            strategy,
        }
    }

    /// Fallback for failures nothing recognizes.
    #[must_use]
    pub const fn unknown() -> Self {
        Self::new(
            ErrorCategory::Unknown,
            Severity::Medium,
            RecoveryStrategy::FailFast,
        )
    }

    /// Whether this failure counts against the database's circuit breaker.
    ///
    /// Integrity, permission and query failures mean the database answered,
    /// so they do not.
    #[must_use]
    pub const fn trips_breaker(&self) -> bool {
        !matches!(
            self.category,
            ErrorCategory::Integrity | ErrorCategory::Permission | ErrorCategory::Query
        )
    }
}

/// A classification together with the context it was made in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Error text.
    pub message: String,
    /// Classification.
    #[serde(flatten)]
    pub classification: Classification,
    /// Where the error happened.
    pub context: ErrorContext,
}

/// Stateless classifier for database failures.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Create a new classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a tagged database error.
    #[must_use]
    pub fn classify(&self, error: &DbError) -> Classification {
        use ErrorCategory as C;
        use RecoveryStrategy as R;
        use Severity as S;

        match error {
            DbError::ConnectionRefused { .. } => Classification::new(C::Network, S::Critical, R::CircuitBreak),
            DbError::ConnectionLost { .. } => Classification::new(C::Network, S::High, R::Retry),
            DbError::Timeout { .. } => Classification::new(C::Timeout, S::Medium, R::Retry),
            DbError::LockContention { .. } => Classification::new(C::Concurrency, S::Medium, R::Retry),
            DbError::IntegrityViolation { .. } => Classification::new(C::Integrity, S::High, R::FailFast),
            DbError::PermissionDenied { .. } => Classification::new(C::Permission, S::Critical, R::FailFast),
            DbError::InvalidQuery { .. } => Classification::new(C::Query, S::Medium, R::FailFast),
            DbError::ResourceExhausted { .. } => Classification::new(C::Resource, S::High, R::CircuitBreak),
            DbError::Other { message } => self.classify_message(message),
        }
    }

    /// Classify a raw error message with the static rule table.
    #[must_use]
    pub fn classify_message(&self, message: &str) -> Classification {
        rules::match_message(message).map_or_else(Classification::unknown, |rule| {
            Classification::new(rule.category, rule.severity, rule.strategy)
        })
    }

    /// Classify an error and attach its context.
    #[must_use]
    pub fn classify_with_context(&self, error: &DbError, context: ErrorContext) -> ClassifiedError {
        ClassifiedError {
            message: error.to_string(),
            classification: self.classify(error),
            context,
        }
    }
}
