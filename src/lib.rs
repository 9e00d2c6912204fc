//! Database Guard
//!
//! Error classification, circuit breaking and retries for calls into
//! relational databases.
//!
//! # Features
//!
//! - Classifies database failures into categories with a severity,
//!   recoverability flag and suggested recovery strategy
//! - One circuit breaker per database alias (CLOSED → OPEN → HALF-OPEN)
//! - Retries recoverable failures with fixed or exponential backoff
//! - Bounded error history with windowed statistics and a health report
//! - `SQLite` adapter and a standalone health probe binary
//!
//! # Quick Start
//!
//! ```bash
//! DATABASE_URL=sqlite://./data/app.db ./db-guard
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  execute()  ┌──────────────────────────────┐
//! │ Application │────────────▶│        DatabaseGuard         │
//! │    code     │◀────────────│ breaker → op → classify      │──────▶ Database
//! └─────────────┘  Result     │ → history → retry / return   │
//!                             └──────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod guard;
pub mod history;
pub mod retry;
pub mod storage;
pub mod traits;

#[cfg(test)]
mod test_utils;
