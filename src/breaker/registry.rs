//! Per-database breaker registry.
//!
//! Breakers are created lazily on first use, all from the same
//! [`BreakerConfig`]. The registry is owned by a
//! [`DatabaseGuard`](crate::guard::DatabaseGuard) and shared by reference.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{Admission, BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitState};

/// Thread-safe collection of circuit breakers keyed by database alias.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration applied to new breakers.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Ask the breaker for `database` for permission to run.
    pub fn try_acquire(&self, database: &str, now: DateTime<Utc>) -> Admission {
        self.with_breaker(database, |cb| cb.try_acquire(now))
    }

    /// Record a success against `database` for a call given `admission`.
    pub fn record_success(&self, database: &str, admission: Admission) {
        self.with_breaker(database, |cb| cb.record_success(admission));
    }

    /// Record a failure against `database` for a call given `admission`.
    pub fn record_failure(&self, database: &str, admission: Admission, now: DateTime<Utc>) {
        self.with_breaker(database, |cb| cb.record_failure(admission, now));
    }

    /// Effective state for `database`; unknown aliases are closed.
    #[must_use]
    pub fn state(&self, database: &str, now: DateTime<Utc>) -> CircuitState {
        self.lock()
            .get(database)
            .map_or(CircuitState::Closed, |cb| cb.state(now))
    }

    /// Whether calls to `database` are currently rejected.
    #[must_use]
    pub fn is_open(&self, database: &str, now: DateTime<Utc>) -> bool {
        self.lock()
            .get(database)
            .is_some_and(|cb| cb.is_open(now))
    }

    /// Snapshot of one breaker, if it exists.
    #[must_use]
    pub fn snapshot(&self, database: &str, now: DateTime<Utc>) -> Option<BreakerSnapshot> {
        self.lock().get(database).map(|cb| cb.snapshot(now))
    }

    /// Snapshots of all breakers, sorted by name.
    #[must_use]
    pub fn snapshots(&self, now: DateTime<Utc>) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.lock().values().map(|cb| cb.snapshot(now)).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Reset the breaker for `database`. Returns false if it does not exist.
    pub fn reset(&self, database: &str) -> bool {
        self.lock().get_mut(database).map(CircuitBreaker::reset).is_some()
    }

    /// Force the breaker for `database` open.
    pub fn trip(&self, database: &str, now: DateTime<Utc>) {
        self.with_breaker(database, |cb| cb.trip(now));
    }

    fn with_breaker<R>(&self, database: &str, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut breakers = self.lock();
        let breaker = breakers
            .entry(database.to_string())
            .or_insert_with(|| CircuitBreaker::new(database, self.config));
        f(breaker)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CircuitBreaker>> {
        self.breakers.lock().unwrap_or_else(|poison_error| {
            tracing::warn!(
                error = %poison_error,
                "Breaker registry lock poisoned, using recovered data"
            );
            poison_error.into_inner()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn registry() -> BreakerRegistry {
        BreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(5),
        })
    }

    #[test]
    fn test_unknown_alias_is_closed() {
        let reg = registry();
        assert_eq!(reg.state("missing", t0()), CircuitState::Closed);
        assert!(!reg.is_open("missing", t0()));
        assert!(reg.snapshot("missing", t0()).is_none());
    }

    #[test]
    fn test_breakers_are_independent() {
        let reg = registry();
        reg.record_failure("primary", Admission::Allowed, t0());
        reg.record_failure("primary", Admission::Allowed, t0());
        reg.record_failure("replica", Admission::Allowed, t0());

        assert_eq!(reg.state("primary", t0()), CircuitState::Open);
        assert_eq!(reg.state("replica", t0()), CircuitState::Closed);
        assert_eq!(reg.try_acquire("replica", t0()), Admission::Allowed);
    }

    #[test]
    fn test_snapshots_sorted_by_name() {
        let reg = registry();
        reg.record_success("zeta", Admission::Allowed);
        reg.record_success("alpha", Admission::Allowed);
        let names: Vec<_> = reg.snapshots(t0()).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_reset_and_trip() {
        let reg = registry();
        assert!(!reg.reset("primary"));

        reg.trip("primary", t0());
        assert!(reg.is_open("primary", t0()));
        assert!(reg.reset("primary"));
        assert_eq!(reg.state("primary", t0()), CircuitState::Closed);
    }

    #[test]
    fn test_concurrent_failures_trip_once() {
        let reg = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 50,
            recovery_timeout: Duration::from_secs(60),
        }));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        reg.record_failure("primary", Admission::Allowed, t0());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = reg.snapshot("primary", t0()).unwrap();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.total_failures, 100);
        assert_eq!(snap.trips, 1);
    }
}
