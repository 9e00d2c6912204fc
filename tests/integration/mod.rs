//! Integration tests for the database guard.
//!
//! These tests drive the public API end to end with a manual clock and,
//! where noted, a real `SQLite` database in a temporary directory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod guard_workflow;
mod health_report;
mod sqlite_workflow;

use chrono::{DateTime, TimeDelta, Utc};
use db_guard::breaker::BreakerConfig;
use db_guard::guard::DatabaseGuard;
use db_guard::retry::RetryPolicy;
use db_guard::traits::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A clock that only moves when told to.
pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            "2024-06-01T12:00:00Z".parse().expect("valid timestamp"),
        )))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += TimeDelta::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Guard with zero retry delay, a 30s recovery timeout and a manual clock.
pub fn test_guard(failure_threshold: u32, max_attempts: u32) -> (DatabaseGuard, Arc<ManualClock>) {
    let clock = ManualClock::new();
    let guard = DatabaseGuard::new(
        BreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_secs(30),
        },
        RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_base_delay(Duration::ZERO),
        50,
    )
    .with_clock(clock.clone());
    (guard, clock)
}
