//! Explicit runtime configuration for the core.
//!
//! # Responsibility
//! - Describe where the store lives and which fixed UTC offset the calendar
//!   uses, without any process-global state.
//!
//! # Invariants
//! - The calendar offset is applied once at construction and never
//!   reinterpreted per call.
//! - Offsets outside `-23:59..=+23:59` are rejected.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

/// Default calendar offset in minutes (`+09:00`).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 9 * 60;
/// Default SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

/// Where the SQLite database is located.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum DbLocation {
    /// Private in-memory database; contents vanish with the connection.
    Memory,
    /// On-disk database file.
    File(PathBuf),
}

/// Configuration shared by store bootstrap and calendar construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub db: DbLocation,
    /// Fixed calendar offset east of UTC, in minutes.
    pub utc_offset_minutes: i32,
    pub busy_timeout_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db: DbLocation::Memory,
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UtcOffsetOutOfRange(i32),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UtcOffsetOutOfRange(minutes) => write!(
                f,
                "utc offset {minutes} minutes is outside -{MAX_OFFSET_MINUTES}..={MAX_OFFSET_MINUTES}"
            ),
        }
    }
}

impl Error for ConfigError {}

impl CoreConfig {
    /// Builds a file-backed configuration with default offset and timeout.
    pub fn with_db_file(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Returns a copy with a different calendar offset.
    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Resolves the configured calendar offset.
    pub fn fixed_offset(&self) -> Result<FixedOffset, ConfigError> {
        let minutes = self.utc_offset_minutes;
        if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&minutes) {
            return Err(ConfigError::UtcOffsetOutOfRange(minutes));
        }
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::UtcOffsetOutOfRange(minutes))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
