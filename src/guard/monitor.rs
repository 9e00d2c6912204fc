//! Periodic health checks until shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::DatabaseGuard;
use crate::traits::DatabaseProbe;

/// Ping `database` through `guard` every `interval` until `shutdown`
/// completes. Returns the number of checks that ran to completion.
///
/// `shutdown` is also raced against the check in progress, so a check
/// waiting out its retry backoff does not delay shutdown. A ready
/// `shutdown` wins over a due tick.
pub async fn run_health_checks<P, S>(
    guard: &DatabaseGuard,
    probe: &P,
    database: &str,
    interval: Duration,
    shutdown: S,
) -> u64
where
    P: DatabaseProbe + ?Sized,
    S: Future,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut checks = 0;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        tracing::info!(database, "Health check abandoned for shutdown");
                        break;
                    }
                    result = guard.execute_async("health_check", database, || probe.ping()) => {
                        checks += 1;
                        match result {
                            Ok(()) => tracing::debug!(database, "Health check passed"),
                            Err(e) => tracing::warn!(database, "Health check failed: {}", e.user_message()),
                        }
                    }
                }
            }
        }
    }

    tracing::info!(database, checks, "Health checks stopped");
    checks
}
