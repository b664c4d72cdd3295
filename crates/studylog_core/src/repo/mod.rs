//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.
//! - Every habit query states its active-filter intent explicitly.
//! - Transactions are `BEGIN IMMEDIATE` and join an already open transaction
//!   instead of nesting.

use crate::db::DbError;
use log::warn;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod emoji_repo;
pub mod habit_repo;
pub mod study_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// No row of `entity` with `id` matched the operation.
    NotFound { entity: &'static str, id: i64 },
    /// Write would break a domain rule such as active-name uniqueness.
    Conflict(String),
    /// Persisted row cannot be converted into a valid model.
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::Conflict(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Runs `f` atomically on `conn`.
///
/// Opens an immediate transaction when the connection is in autocommit mode;
/// otherwise `f` joins the transaction that is already open. Any error
/// returned by `f` rolls the whole transaction back.
pub(crate) fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce() -> RepoResult<T>,
) -> RepoResult<T> {
    if !conn.is_autocommit() {
        return f();
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    match f() {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            warn!("event=tx_rollback module=repo status=start error={err}");
            if let Err(rollback_err) = tx.rollback() {
                warn!("event=tx_rollback module=repo status=error error={rollback_err}");
            }
            Err(err)
        }
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn parse_bool_column(row: &Row<'_>, table: &str, column: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}` in {table}.{column}"
        ))),
    }
}

pub(crate) fn parse_u32_column(row: &Row<'_>, table: &str, column: &str) -> RepoResult<u32> {
    let value: i64 = row.get(column)?;
    u32::try_from(value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid {column} value `{value}` in {table}.{column}"
        ))
    })
}

/// Returns `?, ?, ?` for `count` bind slots.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
