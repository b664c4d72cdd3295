//! Study store schema and connection entry points.
//!
//! # Responsibility
//! - Hand out migrated connections for the study store.
//! - Name the tables every migrated store carries.
//!
//! # Invariants
//! - Every row hangs off a `studies` row; deleting a study cascades to its
//!   points, emojis, habits and habit fulfillments.
//! - Habits are soft-deleted through `is_removed`; only hard deletes cascade
//!   to fulfillments.
//! - The schema version lives in `PRAGMA user_version` and never exceeds
//!   `migrations::latest_version()` for a store this build opened.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with};
pub use rusqlite::Connection;

/// Tables present once all migrations have run, parents first.
pub const STORE_TABLES: &[&str] = &["studies", "points", "emojis", "habits", "habit_fulfillments"];

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Store was migrated by a newer build than this one.
    SchemaTooNew { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "study store schema v{found} is newer than this build supports (v{supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Reads the schema version recorded in the store.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}
