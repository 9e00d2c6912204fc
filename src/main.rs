//! Database health probe binary.
//!
//! Pings the configured database through a [`DatabaseGuard`] on a fixed
//! interval until interrupted, then prints the final health report as JSON
//! to stdout. An interrupt also cancels a check that is waiting out its
//! retry backoff. All logs go to stderr.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use db_guard::config::Config;
use db_guard::error::AppError;
use db_guard::guard::{run_health_checks, DatabaseGuard};
use db_guard::storage::SqliteProbe;

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("db-guard starting...");

    if let Err(e) = run().await {
        tracing::error!("Fatal error: {e}");
        std::process::exit(1);
    }

    tracing::info!("db-guard shutdown complete");
}

#[cfg_attr(coverage_nightly, coverage(off))]
async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing::info!(
        database = %config.database_url.masked_url(),
        alias = %config.database_alias,
        failure_threshold = config.failure_threshold,
        recovery_timeout_ms = config.recovery_timeout_ms,
        max_attempts = config.max_attempts,
        "Configuration loaded"
    );

    let guard = DatabaseGuard::from_config(&config);
    let probe = SqliteProbe::connect_lazy(config.database_url.expose())?;
    let alias = config.database_alias.as_str();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt: {e}");
        }
        tracing::info!("Interrupt received, shutting down");
    };
    run_health_checks(&guard, &probe, alias, config.probe_interval(), shutdown).await;

    let report = guard.health_report(config.stats_window());
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Failed to serialize health report: {e}"),
    }

    probe.close().await;
    Ok(())
}
