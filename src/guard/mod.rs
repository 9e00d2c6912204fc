//! Guarded database execution.
//!
//! [`DatabaseGuard`] is the context object the application builds at
//! startup and passes by reference to every call site. It owns:
//! - the [`ErrorClassifier`]
//! - one circuit breaker per database alias ([`BreakerRegistry`])
//! - the bounded [`ErrorHistory`]
//! - the [`RetryPolicy`]
//! - the [`Clock`] all timing decisions are made with
//!
//! # Data Flow
//! ```text
//! execute(operation, database, op):
//!     → breaker admits or rejects the attempt
//!     → op() runs
//!     → on failure: classify → record history → update breaker → log
//!     → recoverable and attempts left: sleep(backoff) and loop
//!     → otherwise: return GuardError::Operation { attempts, .. }
//! ```
//!
//! # Example
//!
//! ```
//! use db_guard::error::DbError;
//! use db_guard::guard::DatabaseGuard;
//! use db_guard::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let guard = DatabaseGuard::default()
//!     .with_retry_policy(RetryPolicy::new().with_base_delay(Duration::ZERO));
//!
//! let mut calls = 0;
//! let value = guard.execute("orders.count", "default", || {
//!     calls += 1;
//!     if calls < 3 {
//!         Err(DbError::LockContention { message: "database is locked".into() })
//!     } else {
//!         Ok(42)
//!     }
//! });
//!
//! assert_eq!(value, Ok(42));
//! assert_eq!(calls, 3);
//! ```

mod health;
mod monitor;

pub use health::{HealthReport, HealthStatus};
pub use monitor::run_health_checks;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{
    Admission, BreakerConfig, BreakerRegistry, BreakerSnapshot, CircuitState,
};
use crate::classify::{Classification, ErrorClassifier, Severity};
use crate::config::Config;
use crate::error::{DbError, GuardError};
use crate::history::{ErrorHistory, ErrorRecord, ErrorStatistics, DEFAULT_RETENTION};
use crate::retry::RetryPolicy;
use crate::traits::{Clock, SystemClock};

/// A failed attempt that may still be retried.
struct Failure {
    error: DbError,
    classification: Classification,
    attempts: u32,
}

impl Failure {
    fn into_error(self, operation: &str) -> GuardError {
        GuardError::Operation {
            operation: operation.to_string(),
            attempts: self.attempts,
            classification: self.classification,
            source: self.error,
        }
    }
}

enum Next {
    Retry { delay: Duration, failure: Failure },
    Stop(GuardError),
}

/// Classifies, retries and circuit-breaks database operations.
pub struct DatabaseGuard {
    classifier: ErrorClassifier,
    breakers: BreakerRegistry,
    history: ErrorHistory,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for DatabaseGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseGuard")
            .field("breakers", &self.breakers)
            .field("history_len", &self.history.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Default for DatabaseGuard {
    fn default() -> Self {
        Self::new(BreakerConfig::default(), RetryPolicy::default(), DEFAULT_RETENTION)
    }
}

impl DatabaseGuard {
    /// Create a guard using the system clock.
    #[must_use]
    pub fn new(breaker: BreakerConfig, retry: RetryPolicy, history_retention: usize) -> Self {
        Self {
            classifier: ErrorClassifier::new(),
            breakers: BreakerRegistry::new(breaker),
            history: ErrorHistory::new(history_retention),
            retry,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a guard from application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.breaker_config(),
            config.retry_policy(),
            config.history_retention,
        )
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The classifier used for every failure.
    #[must_use]
    pub const fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// The retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run a blocking operation under the breaker for `database`, retrying
    /// recoverable failures.
    ///
    /// # Errors
    ///
    /// - [`GuardError::CircuitOpen`] if the breaker rejected the first attempt
    /// - [`GuardError::Operation`] with the last error and the number of
    ///   attempts made otherwise
    pub fn execute<T, F>(&self, operation: &str, database: &str, mut op: F) -> Result<T, GuardError>
    where
        F: FnMut() -> Result<T, DbError>,
    {
        let mut last = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let admission = self.admit(operation, database, last.take())?;
            match op() {
                Ok(value) => {
                    self.on_success(operation, database, admission, attempt);
                    return Ok(value);
                }
                Err(error) => match self.on_failure(operation, database, admission, attempt, error) {
                    Next::Retry { delay, failure } => {
                        last = Some(failure);
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    Next::Stop(err) => return Err(err),
                },
            }
        }
    }

    /// Async variant of [`execute`](Self::execute); waits with
    /// `tokio::time::sleep` between attempts.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn execute_async<T, F, Fut>(
        &self,
        operation: &str,
        database: &str,
        mut op: F,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let mut last = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let admission = self.admit(operation, database, last.take())?;
            match op().await {
                Ok(value) => {
                    self.on_success(operation, database, admission, attempt);
                    return Ok(value);
                }
                Err(error) => match self.on_failure(operation, database, admission, attempt, error) {
                    Next::Retry { delay, failure } => {
                        last = Some(failure);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                    Next::Stop(err) => return Err(err),
                },
            }
        }
    }

    /// Classify, log and record a failure that happened outside
    /// [`execute`](Self::execute).
    ///
    /// The report counts toward the failure threshold of a closed breaker
    /// but never closes or reopens a half-open one; only the admitted
    /// recovery call decides that.
    pub fn report(&self, operation: &str, database: &str, error: &DbError) -> Classification {
        let classification =
            self.account_failure(operation, database, Admission::Allowed, 1, error);
        log_failure(operation, database, 1, error, classification, "Database operation failed");
        classification
    }

    /// Effective breaker state for `database`.
    #[must_use]
    pub fn breaker_state(&self, database: &str) -> CircuitState {
        self.breakers.state(database, self.clock.now())
    }

    /// Whether calls to `database` are currently rejected.
    #[must_use]
    pub fn is_circuit_open(&self, database: &str) -> bool {
        self.breakers.is_open(database, self.clock.now())
    }

    /// Full breaker state for `database`, if it has been used.
    #[must_use]
    pub fn breaker_snapshot(&self, database: &str) -> Option<BreakerSnapshot> {
        self.breakers.snapshot(database, self.clock.now())
    }

    /// All breakers, sorted by database alias.
    #[must_use]
    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots(self.clock.now())
    }

    /// Manually close the breaker for `database`.
    pub fn reset_breaker(&self, database: &str) -> bool {
        self.breakers.reset(database)
    }

    /// Manually open the breaker for `database`.
    pub fn trip_breaker(&self, database: &str) {
        self.breakers.trip(database, self.clock.now());
    }

    /// Error counts over the trailing `window`.
    #[must_use]
    pub fn error_statistics(&self, window: Duration) -> ErrorStatistics {
        self.history.statistics(self.clock.now(), window)
    }

    /// The newest `limit` error records, newest first.
    #[must_use]
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.history.recent(limit)
    }

    /// Drop all error records.
    pub fn clear_history(&self) {
        self.history.clear();
    }

    /// Overall health over the trailing `window`.
    #[must_use]
    pub fn health_report(&self, window: Duration) -> HealthReport {
        let now = self.clock.now();
        HealthReport::new(
            now,
            self.breakers.snapshots(now),
            self.history.statistics(now, window),
        )
    }

    fn admit(
        &self,
        operation: &str,
        database: &str,
        last: Option<Failure>,
    ) -> Result<Admission, GuardError> {
        match self.breakers.try_acquire(database, self.clock.now()) {
            admission @ Admission::Allowed => Ok(admission),
            admission @ Admission::Probe(_) => {
                tracing::info!(operation, database, "Running recovery probe");
                Ok(admission)
            }
            Admission::Rejected { retry_after } => {
                let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    operation,
                    database,
                    retry_after_ms,
                    "Circuit open, call rejected"
                );
                Err(last.map_or_else(
                    || GuardError::CircuitOpen {
                        database: database.to_string(),
                        retry_after_ms,
                    },
                    |failure| failure.into_error(operation),
                ))
            }
        }
    }

    fn on_success(&self, operation: &str, database: &str, admission: Admission, attempt: u32) {
        self.breakers.record_success(database, admission);
        if attempt > 1 {
            tracing::info!(operation, database, attempts = attempt, "Database operation recovered after retry");
        }
    }

    fn on_failure(
        &self,
        operation: &str,
        database: &str,
        admission: Admission,
        attempt: u32,
        error: DbError,
    ) -> Next {
        let classification = self.account_failure(operation, database, admission, attempt, &error);

        if classification.recoverable && self.retry.should_retry(attempt) {
            let delay = self.retry.delay_after(attempt);
            tracing::warn!(
                operation,
                database,
                category = %classification.category,
                severity = %classification.severity,
                attempt,
                max_attempts = self.retry.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Database operation failed, retrying"
            );
            return Next::Retry {
                delay,
                failure: Failure {
                    error,
                    classification,
                    attempts: attempt,
                },
            };
        }

        let message = if classification.recoverable {
            "Database operation failed, retries exhausted"
        } else {
            "Database operation failed, not retryable"
        };
        log_failure(operation, database, attempt, &error, classification, message);

        Next::Stop(
            Failure {
                error,
                classification,
                attempts: attempt,
            }
            .into_error(operation),
        )
    }

    fn account_failure(
        &self,
        operation: &str,
        database: &str,
        admission: Admission,
        attempt: u32,
        error: &DbError,
    ) -> Classification {
        let now = self.clock.now();
        let classification = self.classifier.classify(error);
        self.history.record(ErrorRecord::new(
            now,
            operation,
            database,
            error,
            classification,
            attempt,
        ));
        if classification.trips_breaker() {
            self.breakers.record_failure(database, admission, now);
        } else {
            self.breakers.record_success(database, admission);
        }
        classification
    }
}

fn log_failure(
    operation: &str,
    database: &str,
    attempt: u32,
    error: &DbError,
    classification: Classification,
    message: &str,
) {
    match classification.severity {
        Severity::Critical | Severity::High => tracing::error!(
            operation,
            database,
            category = %classification.category,
            severity = %classification.severity,
            attempt,
            error = %error,
            "{message}"
        ),
        Severity::Medium | Severity::Low => tracing::warn!(
            operation,
            database,
            category = %classification.category,
            severity = %classification.severity,
            attempt,
            error = %error,
            "{message}"
        ),
    }
}
