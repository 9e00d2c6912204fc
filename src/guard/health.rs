//! Aggregate health derived from breaker states and recent errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::breaker::{BreakerSnapshot, CircuitState};
use crate::classify::Severity;
use crate::history::ErrorStatistics;

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every breaker closed, no critical errors in the window.
    Healthy,
    /// A breaker is probing, or critical errors were seen.
    Degraded,
    /// At least one breaker is open.
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded => f.write_str("degraded"),
            Self::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// Point-in-time health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Derived status.
    pub status: HealthStatus,
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Every known breaker.
    pub breakers: Vec<BreakerSnapshot>,
    /// Error counts over the report window.
    pub statistics: ErrorStatistics,
}

impl HealthReport {
    /// Build a report and derive its status.
    #[must_use]
    pub fn new(
        generated_at: DateTime<Utc>,
        breakers: Vec<BreakerSnapshot>,
        statistics: ErrorStatistics,
    ) -> Self {
        let status = derive_status(&breakers, &statistics);
        Self {
            status,
            generated_at,
            breakers,
            statistics,
        }
    }

    /// Aliases whose breaker is not closed.
    #[must_use]
    pub fn unavailable(&self) -> Vec<&str> {
        self.breakers
            .iter()
            .filter(|b| b.state != CircuitState::Closed)
            .map(|b| b.name.as_str())
            .collect()
    }
}

fn derive_status(breakers: &[BreakerSnapshot], statistics: &ErrorStatistics) -> HealthStatus {
    if breakers.iter().any(|b| b.state == CircuitState::Open) {
        HealthStatus::Unhealthy
    } else if breakers.iter().any(|b| b.state == CircuitState::HalfOpen)
        || statistics.count_at(Severity::Critical) > 0
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
