//! Test utilities and mock factories.
//!
//! This module provides shared testing infrastructure:
//! - [`ManualClock`]: A clock that only moves when told to
//! - Mock factories for [`DatabaseProbe`](crate::traits::DatabaseProbe)
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::DbError;
use crate::traits::{Clock, MockClock, MockDatabaseProbe};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Fixed start time for deterministic tests.
pub fn fixed_time() -> DateTime<Utc> {
    "2024-01-15T10:30:00Z".parse().expect("valid timestamp")
}

/// A clock that starts at [`fixed_time`] and advances manually.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(fixed_time())
    }
}

impl ManualClock {
    /// Start at `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::from_std(by).expect("duration in range");
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Create a mock clock that always returns `time`.
pub fn mock_clock_at(time: DateTime<Utc>) -> MockClock {
    let mut mock = MockClock::new();
    mock.expect_now().return_const(time);
    mock
}

/// Create a mock probe that always succeeds.
pub fn mock_probe_ok() -> MockDatabaseProbe {
    let mut mock = MockDatabaseProbe::new();
    mock.expect_ping().returning(|| Ok(()));
    mock
}

/// Create a mock probe that always fails with `error`.
pub fn mock_probe_err(error: DbError) -> MockDatabaseProbe {
    let mut mock = MockDatabaseProbe::new();
    mock.expect_ping().returning(move || Err(error.clone()));
    mock
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DatabaseProbe;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), fixed_time());
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), fixed_time() + TimeDelta::seconds(90));
    }

    #[test]
    fn test_mock_clock_at() {
        let clock = mock_clock_at(fixed_time());
        assert_eq!(clock.now(), fixed_time());
    }

    #[tokio::test]
    async fn test_mock_probes() {
        assert_eq!(mock_probe_ok().ping().await, Ok(()));
        let err = DbError::Timeout { elapsed_ms: 7 };
        assert_eq!(mock_probe_err(err.clone()).ping().await, Err(err));
    }
}
