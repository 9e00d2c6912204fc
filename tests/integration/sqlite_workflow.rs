//! Real `SQLite` errors flowing through the guard.

use super::test_guard;
use db_guard::breaker::CircuitState;
use db_guard::classify::ErrorCategory;
use db_guard::error::{DbError, GuardError};
use db_guard::storage::{map_sqlx_error, SqliteProbe};
use db_guard::traits::DatabaseProbe;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

async fn create_probe() -> (SqliteProbe, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let probe = SqliteProbe::open(temp_dir.path().join("guard.db"))
        .await
        .expect("Failed to open database");
    sqlx::query("CREATE TABLE accounts (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE)")
        .execute(probe.pool())
        .await
        .expect("Failed to create table");
    (probe, temp_dir)
}

#[tokio::test]
async fn test_guarded_insert_and_duplicate() {
    let (probe, _temp_dir) = create_probe().await;
    let (guard, _) = test_guard(3, 3);
    let pool = probe.pool();

    let insert = |email: &'static str| {
        guard.execute_async("accounts.insert", "main", move || async move {
            sqlx::query("INSERT INTO accounts (email) VALUES (?)")
                .bind(email)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
                .map_err(map_sqlx_error)
        })
    };

    assert_eq!(insert("a@example.com").await, Ok(1));

    let err = insert("a@example.com").await.unwrap_err();
    assert_eq!(err.attempts(), 1);
    assert!(matches!(
        err.db_error(),
        Some(DbError::IntegrityViolation { .. })
    ));
    assert_eq!(guard.breaker_state("main"), CircuitState::Closed);
}

#[tokio::test]
async fn test_guarded_bad_query_fails_fast() {
    let (probe, _temp_dir) = create_probe().await;
    let (guard, _) = test_guard(3, 3);
    let calls = AtomicU32::new(0);
    let pool = probe.pool();

    let err = guard
        .execute_async("accounts.bad", "main", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                sqlx::query("SELECT nope FROM accounts")
                    .execute(pool)
                    .await
                    .map(|_| ())
                    .map_err(map_sqlx_error)
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    match err {
        GuardError::Operation { classification, .. } => {
            assert_eq!(classification.category, ErrorCategory::Query);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_closed_pool_trips_breaker() {
    let (probe, _temp_dir) = create_probe().await;
    let (guard, _) = test_guard(2, 5);

    assert!(guard
        .execute_async("health_check", "main", || probe.ping())
        .await
        .is_ok());

    probe.close().await;
    let err = guard
        .execute_async("health_check", "main", || probe.ping())
        .await
        .unwrap_err();

    // Connection lost is retried until the breaker opens.
    assert_eq!(err.attempts(), 2);
    assert!(matches!(err.db_error(), Some(DbError::ConnectionLost { .. })));
    assert_eq!(guard.breaker_state("main"), CircuitState::Open);
}
