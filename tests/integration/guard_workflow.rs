//! Retry and circuit breaker lifecycle through the public guard API.

use super::test_guard;
use db_guard::breaker::CircuitState;
use db_guard::classify::{ErrorCategory, RecoveryStrategy, Severity};
use db_guard::error::{DbError, GuardError};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::time::Duration;

fn refused() -> DbError {
    DbError::ConnectionRefused {
        message: "connect ECONNREFUSED 10.0.0.5:5432".into(),
    }
}

#[test]
fn test_outage_and_recovery_lifecycle() {
    let (guard, clock) = test_guard(3, 1);
    let calls = Cell::new(0);
    let call = |healthy: bool| {
        guard.execute("orders.fetch", "primary", || {
            calls.set(calls.get() + 1);
            if healthy {
                Ok(())
            } else {
                Err(refused())
            }
        })
    };

    // Three failures open the breaker.
    for _ in 0..3 {
        assert!(call(false).is_err());
    }
    assert_eq!(guard.breaker_state("primary"), CircuitState::Open);
    assert_eq!(calls.get(), 3);

    // Rejected without running the operation.
    assert!(matches!(call(true), Err(GuardError::CircuitOpen { .. })));
    assert_eq!(calls.get(), 3);

    // Recovery timeout elapses: one probe goes through and closes the breaker.
    clock.advance(Duration::from_secs(30));
    assert_eq!(guard.breaker_state("primary"), CircuitState::HalfOpen);
    assert!(call(true).is_ok());
    assert_eq!(calls.get(), 4);
    assert_eq!(guard.breaker_state("primary"), CircuitState::Closed);

    let snapshot = guard.breaker_snapshot("primary").unwrap();
    assert_eq!(snapshot.trips, 1);
    assert_eq!(snapshot.failure_count, 0);
}

#[test]
fn test_retry_budget_counts_total_attempts() {
    let (guard, _) = test_guard(10, 4);
    let calls = Cell::new(0);

    let err = guard
        .execute::<(), _>("inventory.reserve", "primary", || {
            calls.set(calls.get() + 1);
            Err(DbError::LockContention {
                message: "deadlock detected".into(),
            })
        })
        .unwrap_err();

    assert_eq!(calls.get(), 4);
    assert_eq!(err.attempts(), 4);
    let records = guard.recent_errors(10);
    assert_eq!(records.len(), 4);
    // Newest first.
    let attempts: Vec<u32> = records.iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![4, 3, 2, 1]);
}

#[test]
fn test_client_errors_do_not_open_breaker() {
    let (guard, _) = test_guard(2, 3);

    for _ in 0..5 {
        let err = guard
            .execute::<(), _>("users.insert", "primary", || {
                Err(DbError::IntegrityViolation {
                    constraint: Some("users_pkey".into()),
                    message: "duplicate key value violates unique constraint".into(),
                })
            })
            .unwrap_err();
        match err {
            GuardError::Operation {
                attempts,
                classification,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(classification.category, ErrorCategory::Integrity);
                assert_eq!(classification.strategy, RecoveryStrategy::FailFast);
                assert!(!classification.recoverable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(guard.breaker_state("primary"), CircuitState::Closed);
}

#[test]
fn test_untagged_messages_are_classified() {
    let (guard, _) = test_guard(10, 2);
    let calls = Cell::new(0);

    let err = guard
        .execute::<(), _>("report.run", "warehouse", || {
            calls.set(calls.get() + 1);
            Err(DbError::other("ERROR: canceling statement due to statement timeout"))
        })
        .unwrap_err();

    assert_eq!(calls.get(), 2);
    match err {
        GuardError::Operation { classification, .. } => {
            assert_eq!(classification.category, ErrorCategory::Timeout);
            assert_eq!(classification.severity, Severity::Medium);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_success_resets_consecutive_failures() {
    let (guard, _) = test_guard(3, 1);

    for _ in 0..2 {
        let _ = guard.execute::<(), _>("ping", "primary", || Err(refused()));
    }
    assert!(guard.execute("ping", "primary", || Ok(())).is_ok());
    for _ in 0..2 {
        let _ = guard.execute::<(), _>("ping", "primary", || Err(refused()));
    }

    assert_eq!(guard.breaker_state("primary"), CircuitState::Closed);
    assert_eq!(guard.breaker_snapshot("primary").unwrap().failure_count, 2);
}

#[test]
fn test_concurrent_callers_share_breaker() {
    let (guard, _) = test_guard(8, 1);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let _ = guard.execute::<(), _>("ping", "primary", || Err(refused()));
            });
        }
    });

    assert_eq!(guard.breaker_state("primary"), CircuitState::Open);
    assert_eq!(guard.recent_errors(100).len(), 8);
}

#[tokio::test]
async fn test_async_outage_rejects_until_timeout() {
    let (guard, clock) = test_guard(1, 3);

    let err = guard
        .execute_async::<(), _, _>("ping", "primary", || async { Err(refused()) })
        .await
        .unwrap_err();
    // First failure opens the breaker; the retry is rejected.
    assert_eq!(err.attempts(), 1);

    let err = guard
        .execute_async("ping", "primary", || async { Ok::<_, DbError>(()) })
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::CircuitOpen { .. }));
    assert_eq!(
        err.user_message(),
        "The service is temporarily unavailable. Please try again shortly."
    );

    clock.advance(Duration::from_secs(30));
    let value = guard
        .execute_async("ping", "primary", || async { Ok::<_, DbError>(7) })
        .await;
    assert_eq!(value, Ok(7));
}
