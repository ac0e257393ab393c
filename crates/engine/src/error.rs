//! The module contains the errors the engine can throw.
//!
//! Each variant maps onto one error kind the callers care about:
//!
//! - [`NotFound`] the referenced entity does not exist (or is not visible to
//!   the caller).
//! - [`Forbidden`] the principal lacks the role or company permission.
//! - [`BadRequest`] the input failed validation.
//! - [`Conflict`] a status guard fired or a uniqueness rule would be broken.
//! - [`Unauthorized`] a password re-verification failed.
//! - [`Internal`] / [`Database`] unexpected failures.
//!
//!  [`NotFound`]: EngineError::NotFound
//!  [`Forbidden`]: EngineError::Forbidden
//!  [`BadRequest`]: EngineError::BadRequest
//!  [`Conflict`]: EngineError::Conflict
//!  [`Unauthorized`]: EngineError::Unauthorized
//!  [`Internal`]: EngineError::Internal
//!  [`Database`]: EngineError::Database
use sea_orm::{DbErr, RuntimeErr, SqlErr};
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Conflict raised when a status-guarded write touched no rows.
    pub(crate) fn already_processed(what: &str) -> Self {
        Self::Conflict(format!(
            "{what} was already processed by someone else, refresh and try again"
        ))
    }

    /// Conflict raised when the row the transaction is about to write is
    /// named but no longer in the status the operation starts from.
    pub(crate) fn stale(what: &str, status: &str, expected: &str) -> Self {
        Self::Conflict(format!(
            "{what} is {status}, only {expected} ones can be processed"
        ))
    }

    /// Map a database error raised inside a write transaction.
    ///
    /// SQLite refuses the loser of two racing writers with `SQLITE_BUSY` (or
    /// `SQLITE_BUSY_SNAPSHOT` when its read snapshot went stale); that is a
    /// lost race, not a server failure.
    pub(crate) fn from_tx(err: DbErr) -> Self {
        if is_lock_contention(&err) {
            tracing::debug!("write transaction lost a race: {err}");
            return Self::already_processed("the record");
        }
        Self::Database(err)
    }

    /// Map a unique-index violation raised by an insert to `Conflict`.
    pub(crate) fn on_insert(err: DbErr, conflict: &str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Self::Conflict(conflict.to_string()),
            _ => Self::Database(err),
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_lock_contention(err: &DbErr) -> bool {
    let (DbErr::Conn(RuntimeErr::SqlxError(err))
    | DbErr::Exec(RuntimeErr::SqlxError(err))
    | DbErr::Query(RuntimeErr::SqlxError(err))) = err
    else {
        return false;
    };
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .and_then(|code| code.parse::<i32>().ok())
        // extended codes keep the primary code in the low byte
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::BadRequest(a), Self::BadRequest(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Unauthorized(a), Self::Unauthorized(b)) => a == b,
            (Self::Internal(a), Self::Internal(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
