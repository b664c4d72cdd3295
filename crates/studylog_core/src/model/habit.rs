//! Habit and fulfillment domain model.
//!
//! # Responsibility
//! - Define habits owned by a study and the fulfillment records bucketed by
//!   calendar week and weekday.
//! - Model reconciliation input as an explicit id-or-name variant.
//!
//! # Invariants
//! - `habit_name` is unique among active habits of one study.
//! - Fulfillments outlive the soft-delete of their habit.
//! - Several fulfillments may share one habit and bucket.

use crate::model::study::StudyId;
use serde::{Deserialize, Serialize};

pub type HabitId = i64;
pub type FulfillmentId = i64;

/// Recurring habit tracked by one study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub habit_id: HabitId,
    pub study_id: StudyId,
    pub habit_name: String,
    /// Soft-delete flag. Removed habits stay referenced by fulfillments.
    pub is_removed: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl Habit {
    pub fn is_active(&self) -> bool {
        !self.is_removed
    }
}

/// Calendar bucket of one fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FulfillmentBucket {
    pub year: i32,
    /// Zero-based ISO week, clamped to 53.
    pub week: u32,
    /// Days from Sunday.
    pub weekday: u32,
}

impl FulfillmentBucket {
    /// Year/week pair shared by every day of this bucket's week.
    pub fn week_key(&self) -> WeekKey {
        WeekKey {
            year: self.year,
            week: self.week,
        }
    }
}

/// Year and zero-based ISO week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

/// One completion of a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitFulfillment {
    pub fulfillment_id: FulfillmentId,
    pub habit_id: HabitId,
    /// Denormalized owner of `habit_id`.
    pub study_id: StudyId,
    #[serde(flatten)]
    pub bucket: FulfillmentBucket,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// One entry of a client-submitted desired habit roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DesiredHabit {
    /// Keep or rename the habit with this id.
    ById { habit_id: HabitId, name: String },
    /// Ensure an active habit with this name exists.
    ByName { name: String },
}

impl DesiredHabit {
    pub fn name(&self) -> &str {
        match self {
            Self::ById { name, .. } | Self::ByName { name } => name.as_str(),
        }
    }
}

/// Wire shape of one roster entry (`{"habit_pk": 1, "habit_name": "Run"}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredHabitInput {
    #[serde(default)]
    pub habit_pk: Option<HabitId>,
    #[serde(default)]
    pub habit_name: Option<String>,
}

impl DesiredHabitInput {
    /// Converts the wire shape into a resolution variant.
    ///
    /// Returns `None` when the name is missing or empty; such entries are
    /// skipped by reconciliation. A zero or negative id counts as absent.
    pub fn into_desired(self) -> Option<DesiredHabit> {
        let name = self.habit_name.filter(|name| !name.is_empty())?;
        match self.habit_pk {
            Some(habit_id) if habit_id > 0 => Some(DesiredHabit::ById { habit_id, name }),
            _ => Some(DesiredHabit::ByName { name }),
        }
    }
}
