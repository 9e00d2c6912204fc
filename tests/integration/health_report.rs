//! Health report and error statistics.

use super::test_guard;
use db_guard::classify::{ErrorCategory, Severity};
use db_guard::error::DbError;
use db_guard::guard::HealthStatus;
use pretty_assertions::assert_eq;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(3600);

#[test]
fn test_health_follows_breaker_states() {
    let (guard, clock) = test_guard(1, 1);
    assert_eq!(guard.health_report(WINDOW).status, HealthStatus::Healthy);

    let _ = guard.execute::<(), _>("ping", "replica", || {
        Err(DbError::ConnectionLost {
            message: "server closed the connection unexpectedly".into(),
        })
    });
    let report = guard.health_report(WINDOW);
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.unavailable(), vec!["replica"]);

    clock.advance(Duration::from_secs(30));
    assert_eq!(guard.health_report(WINDOW).status, HealthStatus::Degraded);

    assert!(guard.execute("ping", "replica", || Ok(())).is_ok());
    // Breaker closed but the window still holds a high-severity error only.
    assert_eq!(guard.health_report(WINDOW).status, HealthStatus::Healthy);
}

#[test]
fn test_critical_errors_degrade_health_within_window() {
    let (guard, clock) = test_guard(10, 1);

    let _ = guard.execute::<(), _>("audit.write", "primary", || {
        Err(DbError::PermissionDenied {
            message: "permission denied for table audit_log".into(),
        })
    });
    assert_eq!(guard.health_report(WINDOW).status, HealthStatus::Degraded);

    clock.advance(WINDOW + Duration::from_secs(1));
    assert_eq!(guard.health_report(WINDOW).status, HealthStatus::Healthy);
}

#[test]
fn test_statistics_group_by_dimension() {
    let (guard, clock) = test_guard(100, 1);

    let _ = guard.execute::<(), _>("orders.list", "primary", || {
        Err(DbError::Timeout { elapsed_ms: 5000 })
    });
    let _ = guard.execute::<(), _>("orders.list", "replica", || {
        Err(DbError::Timeout { elapsed_ms: 5000 })
    });
    clock.advance(Duration::from_secs(120));
    let _ = guard.execute::<(), _>("users.get", "primary", || {
        Err(DbError::InvalidQuery {
            message: "column \"nmae\" does not exist".into(),
        })
    });

    let stats = guard.error_statistics(Duration::from_secs(600));
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_category.get(&ErrorCategory::Timeout), Some(&2));
    assert_eq!(stats.by_category.get(&ErrorCategory::Query), Some(&1));
    assert_eq!(stats.count_at(Severity::Medium), 3);
    assert_eq!(stats.by_database.get("primary"), Some(&2));
    assert_eq!(stats.by_operation.get("orders.list"), Some(&2));

    let recent = guard.error_statistics(Duration::from_secs(60));
    assert_eq!(recent.total, 1);
}

#[test]
fn test_report_serializes_to_json() {
    let (guard, _) = test_guard(1, 1);
    guard.trip_breaker("primary");

    let json = serde_json::to_value(guard.health_report(WINDOW)).unwrap();
    assert_eq!(json["status"], "unhealthy");
    assert_eq!(json["breakers"][0]["name"], "primary");
    assert_eq!(json["breakers"][0]["state"], "open");
    assert_eq!(json["statistics"]["total"], 0);
}
