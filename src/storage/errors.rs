//! Mapping from `sqlx` errors to tagged database errors.

use sqlx::error::{DatabaseError, ErrorKind};
use std::io;

use crate::error::DbError;

// SQLite primary result codes.
const SQLITE_ERROR: i32 = 1;
const SQLITE_PERM: i32 = 3;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_NOMEM: i32 = 7;
const SQLITE_READONLY: i32 = 8;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_CONSTRAINT: i32 = 19;
const SQLITE_AUTH: i32 = 23;

/// Tag a `sqlx` error.
///
/// Structured information (constraint kind, `SQLite` result code, I/O error
/// kind, pool state) is used first. Anything else becomes
/// [`DbError::Other`] and is classified from its message.
#[must_use]
pub fn map_sqlx_error(error: sqlx::Error) -> DbError {
    match error {
        sqlx::Error::Database(db) => map_database_error(db.as_ref()),
        sqlx::Error::Io(io) => map_io_error(&io),
        sqlx::Error::PoolTimedOut => DbError::Timeout { elapsed_ms: 0 },
        sqlx::Error::PoolClosed => DbError::ConnectionLost {
            message: "connection pool closed".into(),
        },
        sqlx::Error::WorkerCrashed => DbError::ConnectionLost {
            message: "database worker crashed".into(),
        },
        sqlx::Error::Protocol(message) => DbError::ConnectionLost { message },
        sqlx::Error::Tls(e) => DbError::ConnectionRefused {
            message: e.to_string(),
        },
        sqlx::Error::ColumnNotFound(column) => DbError::InvalidQuery {
            message: format!("no such column: {column}"),
        },
        other => DbError::other(other.to_string()),
    }
}

fn map_database_error(db: &dyn DatabaseError) -> DbError {
    let message = db.message().to_string();

    match db.kind() {
        ErrorKind::UniqueViolation
        | ErrorKind::ForeignKeyViolation
        | ErrorKind::NotNullViolation
        | ErrorKind::CheckViolation => {
            return DbError::IntegrityViolation {
                constraint: db.constraint().map(str::to_string),
                message,
            };
        }
        _ => {}
    }

    match primary_code(db) {
        Some(SQLITE_BUSY | SQLITE_LOCKED) => DbError::LockContention { message },
        Some(SQLITE_PERM | SQLITE_READONLY | SQLITE_AUTH) => DbError::PermissionDenied { message },
        Some(SQLITE_NOMEM | SQLITE_FULL) => DbError::ResourceExhausted { message },
        Some(SQLITE_CANTOPEN) => DbError::ConnectionRefused { message },
        Some(SQLITE_CONSTRAINT) => DbError::IntegrityViolation {
            constraint: db.constraint().map(str::to_string),
            message,
        },
        Some(SQLITE_ERROR) => DbError::InvalidQuery { message },
        _ => DbError::Other { message },
    }
}

/// Primary result code from an extended `SQLite` code.
fn primary_code(db: &dyn DatabaseError) -> Option<i32> {
    db.code()?.parse::<i32>().ok().map(|code| code & 0xff)
}

fn map_io_error(error: &io::Error) -> DbError {
    let message = error.to_string();
    match error.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => {
            DbError::ConnectionRefused { message }
        }
        io::ErrorKind::TimedOut => DbError::Timeout { elapsed_ms: 0 },
        io::ErrorKind::PermissionDenied => DbError::PermissionDenied { message },
        _ => DbError::ConnectionLost { message },
    }
}
