//! Bounded error history.
//!
//! This module provides:
//! - [`ErrorRecord`]: one immutable entry per caught failure
//! - [`ErrorHistory`]: a thread-safe ring buffer with a retention bound
//! - [`ErrorStatistics`]: aggregate counts over a trailing window
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use db_guard::classify::{ErrorCategory, ErrorClassifier};
//! use db_guard::error::DbError;
//! use db_guard::history::{ErrorHistory, ErrorRecord};
//! use std::time::Duration;
//!
//! let history = ErrorHistory::new(2);
//! let err = DbError::Timeout { elapsed_ms: 50 };
//! let classification = ErrorClassifier::new().classify(&err);
//! for _ in 0..5 {
//!     history.record(ErrorRecord::new(Utc::now(), "orders.list", "default", &err, classification, 1));
//! }
//! assert_eq!(history.len(), 2);
//!
//! let stats = history.statistics(Utc::now(), Duration::from_secs(60));
//! assert_eq!(stats.by_category.get(&ErrorCategory::Timeout), Some(&2));
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::classify::{Classification, ErrorCategory, Severity};
use crate::error::DbError;

/// Default number of records kept.
pub const DEFAULT_RETENTION: usize = 1_000;

/// A single caught failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When the failure was caught.
    pub timestamp: DateTime<Utc>,
    /// Operation name.
    pub operation: String,
    /// Database alias.
    pub database: String,
    /// Error text.
    pub message: String,
    /// Assigned category.
    pub category: ErrorCategory,
    /// Assigned severity.
    pub severity: Severity,
    /// Attempt on which the failure happened (1-based).
    pub attempt: u32,
}

impl ErrorRecord {
    /// Create a record from a classified error.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        operation: impl Into<String>,
        database: impl Into<String>,
        error: &DbError,
        classification: Classification,
        attempt: u32,
    ) -> Self {
        Self {
            timestamp,
            operation: operation.into(),
            database: database.into(),
            message: error.to_string(),
            category: classification.category,
            severity: classification.severity,
            attempt,
        }
    }
}

/// Aggregate error counts over a trailing window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Errors inside the window.
    pub total: u64,
    /// Counts per category.
    pub by_category: BTreeMap<ErrorCategory, u64>,
    /// Counts per severity.
    pub by_severity: BTreeMap<Severity, u64>,
    /// Counts per database alias.
    pub by_database: BTreeMap<String, u64>,
    /// Counts per operation.
    pub by_operation: BTreeMap<String, u64>,
    /// Timestamp of the newest error in the window.
    pub most_recent: Option<DateTime<Utc>>,
}

impl ErrorStatistics {
    /// Count of errors at `severity` inside the window.
    #[must_use]
    pub fn count_at(&self, severity: Severity) -> u64 {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }
}

/// Thread-safe bounded error history.
#[derive(Debug)]
pub struct ErrorHistory {
    retention: usize,
    records: RwLock<VecDeque<ErrorRecord>>,
}

impl Default for ErrorHistory {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl ErrorHistory {
    /// Create a history that keeps at most `retention` records.
    #[must_use]
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            records: RwLock::new(VecDeque::with_capacity(retention.min(DEFAULT_RETENTION))),
        }
    }

    /// Retention bound.
    #[must_use]
    pub const fn retention(&self) -> usize {
        self.retention
    }

    /// Append a record, evicting the oldest ones beyond the retention bound.
    pub fn record(&self, record: ErrorRecord) {
        let mut records = self.write();
        records.push_back(record);
        while records.len() > self.retention {
            records.pop_front();
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// The newest `limit` records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    /// Aggregate records with `now - window <= timestamp <= now`.
    #[must_use]
    pub fn statistics(&self, now: DateTime<Utc>, window: Duration) -> ErrorStatistics {
        let cutoff = TimeDelta::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut stats = ErrorStatistics {
            window_secs: window.as_secs(),
            ..ErrorStatistics::default()
        };

        for record in self
            .read()
            .iter()
            .filter(|r| r.timestamp >= cutoff && r.timestamp <= now)
        {
            stats.total += 1;
            *stats.by_category.entry(record.category).or_default() += 1;
            *stats.by_severity.entry(record.severity).or_default() += 1;
            *stats.by_database.entry(record.database.clone()).or_default() += 1;
            *stats.by_operation.entry(record.operation.clone()).or_default() += 1;
            stats.most_recent = stats.most_recent.max(Some(record.timestamp));
        }

        stats
    }

    /// Remove all records.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<ErrorRecord>> {
        self.records.read().unwrap_or_else(|poison_error| {
            tracing::warn!(
                error = %poison_error,
                "Reading error history from poisoned lock, using recovered data"
            );
            poison_error.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<ErrorRecord>> {
        self.records.write().unwrap_or_else(|poison_error| {
            tracing::warn!(
                error = %poison_error,
                "Writing error history through poisoned lock, using recovered data"
            );
            poison_error.into_inner()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classify::ErrorClassifier;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn record_at(offset_secs: i64, database: &str, error: &DbError) -> ErrorRecord {
        let classification = ErrorClassifier::new().classify(error);
        ErrorRecord::new(
            t0() + TimeDelta::seconds(offset_secs),
            "orders.list",
            database,
            error,
            classification,
            1,
        )
    }

    #[test]
    fn test_record_fields() {
        let record = record_at(0, "default", &DbError::other("connection refused"));
        assert_eq!(record.category, ErrorCategory::Network);
        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.message, "connection refused");
        assert_eq!(record.attempt, 1);
    }

    #[test]
    fn test_evicts_oldest() {
        let history = ErrorHistory::new(3);
        for i in 0..5 {
            history.record(record_at(i, "default", &DbError::Timeout { elapsed_ms: 1 }));
        }
        assert_eq!(history.len(), 3);
        let recent = history.recent(10);
        assert_eq!(recent[0].timestamp, t0() + TimeDelta::seconds(4));
        assert_eq!(recent[2].timestamp, t0() + TimeDelta::seconds(2));
    }

    #[test]
    fn test_zero_retention_keeps_nothing() {
        let history = ErrorHistory::new(0);
        history.record(record_at(0, "default", &DbError::other("x")));
        assert!(history.is_empty());
    }

    #[test]
    fn test_statistics_window() {
        let history = ErrorHistory::new(100);
        history.record(record_at(0, "primary", &DbError::other("connection refused")));
        history.record(record_at(50, "primary", &DbError::Timeout { elapsed_ms: 1 }));
        history.record(record_at(55, "replica", &DbError::Timeout { elapsed_ms: 1 }));

        let now = t0() + TimeDelta::seconds(60);
        let stats = history.statistics(now, Duration::from_secs(30));

        assert_eq!(stats.window_secs, 30);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_category.get(&ErrorCategory::Timeout), Some(&2));
        assert_eq!(stats.by_category.get(&ErrorCategory::Network), None);
        assert_eq!(stats.by_database.get("primary"), Some(&1));
        assert_eq!(stats.by_database.get("replica"), Some(&1));
        assert_eq!(stats.count_at(Severity::Medium), 2);
        assert_eq!(stats.count_at(Severity::Critical), 0);
        assert_eq!(stats.most_recent, Some(t0() + TimeDelta::seconds(55)));

        let all = history.statistics(now, Duration::from_secs(3600));
        assert_eq!(all.total, 3);
        assert_eq!(all.count_at(Severity::Critical), 1);
    }

    #[test]
    fn test_statistics_ignore_future_records() {
        let history = ErrorHistory::new(10);
        history.record(record_at(100, "primary", &DbError::other("x")));
        assert_eq!(history.statistics(t0(), Duration::from_secs(60)).total, 0);
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let history = ErrorHistory::new(10);
        history.record(record_at(0, "primary", &DbError::other("x")));
        let stats = history.statistics(t0(), Duration::from_secs(u64::MAX));
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn test_statistics_serialize() {
        let history = ErrorHistory::new(10);
        history.record(record_at(0, "primary", &DbError::other("deadlock detected")));
        let json = serde_json::to_string(&history.statistics(t0(), Duration::from_secs(60))).unwrap();
        assert!(json.contains("\"concurrency\":1"));
        assert!(json.contains("\"medium\":1"));
    }

    #[test]
    fn test_clear() {
        let history = ErrorHistory::new(10);
        history.record(record_at(0, "primary", &DbError::other("x")));
        history.clear();
        assert!(history.is_empty());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_retention(retention in 0usize..64, inserts in 0usize..500) {
            let history = ErrorHistory::new(retention);
            let err = DbError::other("x");
            for i in 0..inserts {
                history.record(record_at(i64::try_from(i).unwrap(), "db", &err));
                prop_assert!(history.len() <= retention);
            }
            prop_assert_eq!(history.len(), inserts.min(retention));
        }
    }
}
