//! Circuit breaker for database protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: database assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the database recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures reach failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since the last failure
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (timeout clock restarts)
//! ```
//!
//! Half-open admits exactly one probe. Every other caller is rejected until
//! the probe reports back. A probe that never reports is treated as lost once
//! another `recovery_timeout` has passed, and a fresh probe is admitted.
//!
//! Outcomes are recorded against the [`Admission`] the call was given. Only
//! the live probe's outcome moves a half-open breaker; results of calls
//! admitted before the trip, of lost probes, or reported from outside a
//! guarded call only update the counters.
//!
//! The breaker never reads the clock itself; callers pass `now`.

mod registry;

pub use registry::BreakerRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default consecutive failures before tripping.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default recovery timeout.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, operations proceed normally.
    Closed,
    /// Circuit is open, operations are blocked.
    Open,
    /// Circuit is half-open, a single probe is allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Number of consecutive failures before tripping.
    pub failure_threshold: u32,
    /// Time since the last failure before a probe is admitted.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

/// Identifies one half-open probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTicket(u64);

/// Outcome of asking the breaker for permission to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Closed circuit; run normally.
    Allowed,
    /// Half-open circuit; this call is the single probe.
    Probe(ProbeTicket),
    /// Call must not run.
    Rejected {
        /// Time until a probe may be admitted.
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the call may run.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Whether this call was admitted as a probe.
    #[must_use]
    pub const fn is_probe(&self) -> bool {
        matches!(self, Self::Probe(_))
    }
}

/// Circuit breaker for one database alias.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<DateTime<Utc>>,
    probe_started: Option<DateTime<Utc>>,
    probe_generation: u64,
    total_failures: u64,
    total_successes: u64,
    trips: u64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probe_started: None,
            probe_generation: 0,
            total_failures: 0,
            total_successes: 0,
            trips: 0,
        }
    }

    /// Breaker name (the database alias).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Breaker configuration.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current consecutive failure count.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }

    /// Effective state at `now`.
    ///
    /// An open breaker whose recovery timeout has elapsed reports
    /// [`CircuitState::HalfOpen`] even before a probe is dispatched.
    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> CircuitState {
        match self.state {
            CircuitState::Open if self.cooldown_elapsed(now) => CircuitState::HalfOpen,
            state => state,
        }
    }

    /// Whether a call arriving at `now` would be rejected.
    ///
    /// True when open, or half-open with a live probe in flight.
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        match self.state(now) {
            CircuitState::Closed => false,
            CircuitState::Open => true,
            CircuitState::HalfOpen => self.probe_in_flight(now),
        }
    }

    /// Ask for permission to run a call at `now`.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                if self.cooldown_elapsed(now) {
                    self.transition_to(CircuitState::HalfOpen);
                    tracing::info!(breaker = %self.name, "Circuit half-open, dispatching probe");
                    self.issue_probe(now)
                } else {
                    Admission::Rejected {
                        retry_after: self.remaining_cooldown(now).unwrap_or_default(),
                    }
                }
            }
            CircuitState::HalfOpen => match self.probe_started {
                Some(started) if elapsed(started, now) < self.config.recovery_timeout => {
                    Admission::Rejected {
                        retry_after: self
                            .config
                            .recovery_timeout
                            .saturating_sub(elapsed(started, now)),
                    }
                }
                lost => {
                    if lost.is_some() {
                        tracing::warn!(breaker = %self.name, "Probe never reported, admitting a new one");
                    }
                    self.issue_probe(now)
                }
            },
        }
    }

    /// Record a successful call that was given `admission`.
    pub fn record_success(&mut self, admission: Admission) {
        self.total_successes += 1;

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if self.is_live_probe(admission) => {
                self.transition_to(CircuitState::Closed);
                tracing::info!(breaker = %self.name, "Probe succeeded, circuit closed");
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                tracing::debug!(breaker = %self.name, state = %self.state, "Ignoring success outside the probe");
            }
        }
    }

    /// Record a failed call that was given `admission`, at `now`.
    pub fn record_failure(&mut self, admission: Admission, now: DateTime<Utc>) {
        self.total_failures += 1;

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.open("failure threshold reached");
                }
            }
            CircuitState::HalfOpen if self.is_live_probe(admission) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure = Some(now);
                self.open("probe failed");
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                tracing::debug!(breaker = %self.name, state = %self.state, "Ignoring failure outside the probe");
            }
        }
    }

    /// Manually reset the circuit breaker.
    pub fn reset(&mut self) {
        tracing::info!(breaker = %self.name, previous = %self.state, "Circuit breaker reset");
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.last_failure = None;
        self.probe_started = None;
    }

    /// Force the circuit open at `now`.
    pub fn trip(&mut self, now: DateTime<Utc>) {
        self.last_failure = Some(now);
        self.open("forced open");
    }

    /// Remaining cooldown if the circuit is open at `now`.
    #[must_use]
    pub fn remaining_cooldown(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }

        self.last_failure.map(|last| {
            self.config
                .recovery_timeout
                .saturating_sub(elapsed(last, now))
        })
    }

    /// Serializable view of the breaker at `now`.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> BreakerSnapshot {
        BreakerSnapshot {
            name: self.name.clone(),
            state: self.state(now),
            failure_count: self.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: duration_ms(self.config.recovery_timeout),
            last_failure: self.last_failure,
            remaining_cooldown_ms: self.remaining_cooldown(now).map(duration_ms),
            probe_in_flight: self.probe_in_flight(now),
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            trips: self.trips,
        }
    }

    fn issue_probe(&mut self, now: DateTime<Utc>) -> Admission {
        self.probe_generation += 1;
        self.probe_started = Some(now);
        Admission::Probe(ProbeTicket(self.probe_generation))
    }

    fn is_live_probe(&self, admission: Admission) -> bool {
        self.probe_started.is_some()
            && admission == Admission::Probe(ProbeTicket(self.probe_generation))
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.last_failure
            .is_none_or(|last| elapsed(last, now) >= self.config.recovery_timeout)
    }

    fn probe_in_flight(&self, now: DateTime<Utc>) -> bool {
        self.state == CircuitState::HalfOpen
            && self
                .probe_started
                .is_some_and(|started| elapsed(started, now) < self.config.recovery_timeout)
    }

    fn open(&mut self, reason: &'static str) {
        self.transition_to(CircuitState::Open);
        self.trips += 1;
        tracing::error!(
            event = "circuit_breaker_tripped",
            severity = "high",
            breaker = %self.name,
            reason,
            consecutive_failures = self.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            recovery_timeout_ms = duration_ms(self.config.recovery_timeout),
            "Circuit breaker tripped"
        );
    }

    fn transition_to(&mut self, new_state: CircuitState) {
        if self.state != new_state {
            self.state = new_state;
            match new_state {
                CircuitState::Closed => {
                    self.consecutive_failures = 0;
                    self.probe_started = None;
                }
                CircuitState::HalfOpen => {}
                CircuitState::Open => {
                    // Keep failure count for diagnostics
                    self.probe_started = None;
                }
            }
        }
    }
}

/// Serializable circuit breaker state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Breaker name (database alias).
    pub name: String,
    /// Effective state.
    pub state: CircuitState,
    /// Consecutive failures.
    pub failure_count: u32,
    /// Failures needed to trip.
    pub failure_threshold: u32,
    /// Recovery timeout in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Time of the last failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Remaining cooldown in milliseconds, when open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_cooldown_ms: Option<u64>,
    /// Whether a half-open probe is running.
    pub probe_in_flight: bool,
    /// Total failures recorded.
    pub total_failures: u64,
    /// Total successes recorded.
    pub total_successes: u64,
    /// Number of times the circuit has tripped.
    pub trips: u64,
}

/// Elapsed time from `then` to `now`; zero if the clock went backwards.
fn elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or_default()
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unreadable_literal
)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        t0() + TimeDelta::seconds(n)
    }

    fn create_fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(10),
        }
    }

    fn tripped() -> CircuitBreaker {
        let mut cb = CircuitBreaker::new("default", create_fast_config());
        for _ in 0..3 {
            cb.record_failure(Admission::Allowed, t0());
        }
        cb
    }

    fn admit_trial(cb: &mut CircuitBreaker, now: DateTime<Utc>) -> Admission {
        let admission = cb.try_acquire(now);
        assert!(admission.is_probe(), "expected a trial call, got {admission:?}");
        admission
    }

    #[test]
    fn test_circuit_breaker_initial_state() {
        let cb = CircuitBreaker::new("default", BreakerConfig::default());
        assert_eq!(cb.state(t0()), CircuitState::Closed);
        assert!(!cb.is_open(t0()));
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_trips_exactly_on_threshold() {
        let mut cb = CircuitBreaker::new("default", create_fast_config());

        cb.record_failure(Admission::Allowed, t0());
        assert_eq!(cb.state(t0()), CircuitState::Closed);
        cb.record_failure(Admission::Allowed, t0());
        assert_eq!(cb.state(t0()), CircuitState::Closed);
        cb.record_failure(Admission::Allowed, t0());
        assert_eq!(cb.state(t0()), CircuitState::Open);
        assert!(cb.is_open(t0()));
        assert_eq!(cb.snapshot(t0()).trips, 1);
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let mut cb = CircuitBreaker::new("default", create_fast_config());

        cb.record_failure(Admission::Allowed, t0());
        cb.record_failure(Admission::Allowed, t0());
        cb.record_success(Admission::Allowed);
        cb.record_failure(Admission::Allowed, t0());

        assert_eq!(cb.state(t0()), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_blocks_when_open() {
        let mut cb = tripped();
        let admission = cb.try_acquire(secs(4));
        assert_eq!(
            admission,
            Admission::Rejected {
                retry_after: Duration::from_secs(6)
            }
        );
        assert!(!admission.is_admitted());
    }

    #[test]
    fn test_reports_half_open_after_timeout() {
        let cb = tripped();
        assert_eq!(cb.state(secs(9)), CircuitState::Open);
        assert_eq!(cb.state(secs(10)), CircuitState::HalfOpen);
        // Ready to admit a probe, so not blocking.
        assert!(!cb.is_open(secs(10)));
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let mut cb = tripped();

        admit_trial(&mut cb, secs(10));
        assert!(cb.is_open(secs(10)));
        assert!(matches!(
            cb.try_acquire(secs(11)),
            Admission::Rejected { .. }
        ));
        assert!(matches!(
            cb.try_acquire(secs(12)),
            Admission::Rejected { .. }
        ));
        assert!(cb.snapshot(secs(11)).probe_in_flight);
    }

    #[test]
    fn test_probe_success_closes_and_resets() {
        let mut cb = tripped();
        let trial = admit_trial(&mut cb, secs(10));

        cb.record_success(trial);

        assert_eq!(cb.state(secs(10)), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.try_acquire(secs(10)), Admission::Allowed);
    }

    #[test]
    fn test_probe_failure_reopens_and_restarts_clock() {
        let mut cb = tripped();
        let trial = admit_trial(&mut cb, secs(10));

        cb.record_failure(trial, secs(11));

        assert_eq!(cb.state(secs(11)), CircuitState::Open);
        assert_eq!(cb.state(secs(20)), CircuitState::Open);
        assert_eq!(cb.state(secs(21)), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot(secs(11)).trips, 2);
    }

    #[test]
    fn test_lost_probe_is_replaced() {
        let mut cb = tripped();
        let first = admit_trial(&mut cb, secs(10));
        assert!(matches!(
            cb.try_acquire(secs(19)),
            Admission::Rejected { .. }
        ));
        let second = admit_trial(&mut cb, secs(20));
        assert_ne!(first, second);
    }

    #[test]
    fn test_late_success_does_not_close_open_circuit() {
        let mut cb = tripped();
        cb.record_success(Admission::Allowed);
        assert_eq!(cb.state(secs(1)), CircuitState::Open);
    }

    #[test]
    fn test_late_failure_does_not_extend_cooldown() {
        let mut cb = tripped();
        cb.record_failure(Admission::Allowed, secs(5));
        assert_eq!(cb.state(secs(10)), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot(secs(10)).total_failures, 4);
    }

    #[test]
    fn test_pre_trip_outcomes_leave_half_open_alone() {
        let mut cb = tripped();
        let trial = admit_trial(&mut cb, secs(10));

        // Calls admitted while closed finish during the trial.
        cb.record_success(Admission::Allowed);
        assert_eq!(cb.state(secs(11)), CircuitState::HalfOpen);
        assert!(cb.is_open(secs(11)));
        cb.record_failure(Admission::Allowed, secs(11));
        assert_eq!(cb.state(secs(11)), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot(secs(11)).trips, 1);

        cb.record_success(trial);
        assert_eq!(cb.state(secs(12)), CircuitState::Closed);
    }

    #[test]
    fn test_pre_trip_success_before_trial_keeps_breaker_recovering() {
        let mut cb = tripped();
        // Effective half-open, no trial admitted yet.
        assert_eq!(cb.state(secs(10)), CircuitState::HalfOpen);
        cb.record_success(Admission::Allowed);
        assert_eq!(cb.state(secs(10)), CircuitState::HalfOpen);

        let trial = admit_trial(&mut cb, secs(10));
        cb.record_failure(trial, secs(10));
        assert_eq!(cb.state(secs(10)), CircuitState::Open);
        assert_eq!(cb.snapshot(secs(10)).trips, 2);
    }

    #[test]
    fn test_stale_trial_outcome_is_ignored() {
        let mut cb = tripped();
        let lost = admit_trial(&mut cb, secs(10));
        let current = admit_trial(&mut cb, secs(20));

        cb.record_failure(lost, secs(21));
        assert_eq!(cb.state(secs(21)), CircuitState::HalfOpen);
        cb.record_success(lost);
        assert_eq!(cb.state(secs(21)), CircuitState::HalfOpen);

        cb.record_success(current);
        assert_eq!(cb.state(secs(21)), CircuitState::Closed);
    }

    #[test]
    fn test_trial_ticket_does_not_outlive_reset() {
        let mut cb = tripped();
        let trial = admit_trial(&mut cb, secs(10));
        cb.reset();
        cb.trip(secs(11));

        let next = admit_trial(&mut cb, secs(21));
        cb.record_failure(trial, secs(21));
        assert_eq!(cb.state(secs(21)), CircuitState::HalfOpen);
        cb.record_success(next);
        assert_eq!(cb.state(secs(21)), CircuitState::Closed);
    }

    #[test]
    fn test_manual_reset() {
        let mut cb = tripped();
        cb.reset();
        assert_eq!(cb.state(t0()), CircuitState::Closed);
        assert_eq!(cb.try_acquire(t0()), Admission::Allowed);
    }

    #[test]
    fn test_manual_trip() {
        let mut cb = CircuitBreaker::new("default", create_fast_config());
        cb.trip(t0());
        assert_eq!(cb.state(t0()), CircuitState::Open);
        assert!(!cb.try_acquire(t0()).is_admitted());
    }

    #[test]
    fn test_remaining_cooldown() {
        let mut cb = CircuitBreaker::new("default", create_fast_config());
        assert!(cb.remaining_cooldown(t0()).is_none());

        cb.trip(t0());
        assert_eq!(cb.remaining_cooldown(secs(3)), Some(Duration::from_secs(7)));
        assert_eq!(cb.remaining_cooldown(secs(30)), Some(Duration::ZERO));
    }

    #[test]
    fn test_clock_going_backwards_keeps_circuit_open() {
        let mut cb = CircuitBreaker::new("default", create_fast_config());
        cb.trip(secs(100));
        assert_eq!(cb.state(secs(50)), CircuitState::Open);
    }

    #[test]
    fn test_snapshot_serialize() {
        let cb = tripped();
        let json = serde_json::to_string(&cb.snapshot(secs(1))).unwrap();
        assert!(json.contains("\"state\":\"open\""));
        assert!(json.contains("\"remaining_cooldown_ms\":9000"));
        assert!(json.contains("\"failure_threshold\":3"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert_eq!(CircuitState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_default_config_values() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Acquire,
        Success,
        Failure,
        LateSuccess,
        LateFailure,
        Advance(i64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Acquire),
            Just(Step::Success),
            Just(Step::Failure),
            Just(Step::LateSuccess),
            Just(Step::LateFailure),
            (1i64..15).prop_map(Step::Advance),
        ]
    }

    fn allowed(from: CircuitState, to: CircuitState) -> bool {
        use CircuitState::{Closed, HalfOpen, Open};
        from == to
            || matches!(
                (from, to),
                (Closed, Open) | (Open, HalfOpen) | (HalfOpen, Closed) | (HalfOpen, Open)
            )
    }

    proptest! {
        #[test]
        fn prop_transitions_follow_state_machine(steps in proptest::collection::vec(step(), 0..200)) {
            let mut cb = CircuitBreaker::new("db", create_fast_config());
            let mut now = t0();
            let mut last = Admission::Allowed;

            for step in steps {
                let before = cb.state(now);
                let late = matches!(step, Step::LateSuccess | Step::LateFailure);
                match step {
                    Step::Acquire => last = cb.try_acquire(now),
                    Step::Success => cb.record_success(last),
                    Step::Failure => cb.record_failure(last, now),
                    Step::LateSuccess => cb.record_success(Admission::Allowed),
                    Step::LateFailure => cb.record_failure(Admission::Allowed, now),
                    Step::Advance(s) => now += TimeDelta::seconds(s),
                }
                let after = cb.state(now);
                prop_assert!(allowed(before, after), "{before} -> {after}");
                if late && before != CircuitState::Closed {
                    prop_assert_eq!(before, after);
                }
                if after == CircuitState::Closed {
                    prop_assert!(cb.failure_count() < 3);
                }
            }
        }
    }
}
