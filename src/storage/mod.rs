//! `SQLite` adapter.
//!
//! This module connects the guard to a real database through `sqlx`:
//! - [`map_sqlx_error`]: Tags driver errors as [`DbError`](crate::error::DbError) variants
//! - [`SqliteProbe`]: A [`DatabaseProbe`](crate::traits::DatabaseProbe) running `SELECT 1`
//!
//! Application code that runs its own queries should map failures with
//! [`map_sqlx_error`] before handing them to the guard, so the classifier
//! sees tagged variants instead of raw messages.

mod errors;
mod probe;

pub use errors::map_sqlx_error;
pub use probe::SqliteProbe;
