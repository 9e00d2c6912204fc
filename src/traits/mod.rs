//! Trait definitions for mockable dependencies.
//!
//! This module defines traits for:
//! - [`Clock`]: Time abstraction so breaker timeouts can be tested
//! - [`DatabaseProbe`]: A cheap liveness query against one database
//!
//! # Mocking
//!
//! Both traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.
//!
//! # Example
//!
//! ```
//! use db_guard::traits::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let now = clock.now();
//! println!("Current time: {now}");
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;

/// Time provider.
///
/// The guard reads time only through this trait.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time provider using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Liveness check against a single database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Run a trivial query.
    ///
    /// # Errors
    ///
    /// Returns a tagged [`DbError`] when the database cannot answer.
    async fn ping(&self) -> Result<(), DbError>;
}
