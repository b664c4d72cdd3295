//! Fixed-offset calendar used to bucket habit fulfillments.
//!
//! # Responsibility
//! - Derive the `(year, week, weekday)` bucket of the current instant.
//! - Keep the timezone convention independent of the host timezone.
//!
//! # Invariants
//! - `week` is the ISO week number minus one, never above 53.
//! - `weekday` counts days from Sunday (Sunday = 0, Saturday = 6).
//! - `year` is the calendar year of the local date, not the ISO week-year.

use crate::config::{ConfigError, CoreConfig};
use crate::model::habit::FulfillmentBucket;
use chrono::{DateTime, Datelike, FixedOffset, Utc};

const MAX_BUCKET_WEEK: u32 = 53;

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pinned instant, for deterministic callers and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Calendar bound to one fixed UTC offset.
#[derive(Debug, Clone)]
pub struct Calendar<C: Clock = SystemClock> {
    offset: FixedOffset,
    clock: C,
}

impl Calendar<SystemClock> {
    /// Builds a wall-clock calendar from core configuration.
    pub fn from_config(config: &CoreConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.fixed_offset()?, SystemClock))
    }
}

impl<C: Clock> Calendar<C> {
    pub fn new(offset: FixedOffset, clock: C) -> Self {
        Self { offset, clock }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Returns the bucket of the current instant.
    pub fn current_bucket(&self) -> FulfillmentBucket {
        bucket_for(self.clock.now().with_timezone(&self.offset))
    }

    /// Returns the calendar year of the current local date.
    pub fn local_year(&self) -> i32 {
        self.clock.now().with_timezone(&self.offset).year()
    }
}

/// Buckets one local timestamp.
pub fn bucket_for(local: DateTime<FixedOffset>) -> FulfillmentBucket {
    let week = local.iso_week().week().saturating_sub(1).min(MAX_BUCKET_WEEK);
    FulfillmentBucket {
        year: local.year(),
        week,
        weekday: local.weekday().num_days_from_sunday(),
    }
}
