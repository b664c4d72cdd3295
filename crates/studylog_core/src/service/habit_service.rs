//! Habit use-case service.
//!
//! # Responsibility
//! - Answer "today" and "this week" fulfillment views from the current
//!   calendar bucket.
//! - Provide habit CRUD, fulfillment recording and roster reconciliation.
//!
//! # Invariants
//! - Fulfillments are always recorded in the calendar's current bucket,
//!   never in a client-supplied one.
//! - Single-habit operations are scoped to the owning study; a habit of
//!   another study is reported as not found.
//! - The weekly view keeps removed habits that were fulfilled this week.

use crate::calendar::{Calendar, Clock, SystemClock};
use crate::model::habit::{
    DesiredHabit, DesiredHabitInput, FulfillmentId, Habit, HabitFulfillment, HabitId,
};
use crate::model::study::StudyId;
use crate::repo::habit_repo::{
    ActiveFilter, BucketFilter, FulfillmentFilter, HabitFilter, HabitRepository,
};
use crate::repo::{RepoError, RepoResult};
use crate::service::habit_reconcile::{reconcile_habits, ReconcileOutcome};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for habit use-cases.
#[derive(Debug)]
pub enum HabitServiceError {
    /// Request payload violates a field contract.
    InvalidInput(String),
    /// Referenced habit or fulfillment does not exist in the given scope.
    NotFound { entity: &'static str, id: i64 },
    /// Persistence-layer failure, including rolled-back transactions.
    Store(RepoError),
}

impl Display for HabitServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HabitServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for HabitServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Conflict(message) => Self::InvalidInput(message),
            other => Self::Store(other),
        }
    }
}

pub type HabitServiceResult<T> = Result<T, HabitServiceError>;

/// Habit with activity in the current day bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayHabit {
    pub habit_id: HabitId,
    pub habit_name: String,
    pub has_fulfillment: bool,
    pub fulfillment_count: usize,
}

/// Habit with its fulfillments of the current week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekHabit {
    pub habit_id: HabitId,
    pub habit_name: String,
    pub is_removed: bool,
    pub week_fulfillments: Vec<HabitFulfillment>,
    /// Weekday (Sunday = 0) to number of fulfillments.
    pub fulfillment_count_by_day: BTreeMap<u32, usize>,
    pub total_fulfillment_count: usize,
}

/// Result of plain habit creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateHabitsOutcome {
    pub created: Vec<Habit>,
    /// Requested names already held by a habit of the study.
    pub skipped: Vec<String>,
    pub total_created: usize,
}

/// Habit service facade over repository implementations.
pub struct HabitService<R: HabitRepository, C: Clock = SystemClock> {
    repo: R,
    calendar: Calendar<C>,
}

impl<R: HabitRepository, C: Clock> HabitService<R, C> {
    pub fn new(repo: R, calendar: Calendar<C>) -> Self {
        Self { repo, calendar }
    }

    /// Lists active habits fulfilled at least once in today's bucket.
    ///
    /// Habits without a fulfillment today are not part of the result.
    pub fn today_habits(&self, study_id: StudyId) -> HabitServiceResult<Vec<TodayHabit>> {
        let today = BucketFilter::day(self.calendar.current_bucket());
        let habits = self.repo.find_habits(
            &HabitFilter::study(study_id, ActiveFilter::ActiveOnly).fulfilled_in(today),
        )?;
        let counts = count_by_habit(&self.load_fulfillments(study_id, today, &habits)?);

        Ok(habits
            .into_iter()
            .map(|habit| {
                let fulfillment_count = counts.get(&habit.habit_id).copied().unwrap_or(0);
                TodayHabit {
                    habit_id: habit.habit_id,
                    habit_name: habit.habit_name,
                    has_fulfillment: fulfillment_count > 0,
                    fulfillment_count,
                }
            })
            .collect())
    }

    /// Lists habits that are active or were fulfilled this week, with
    /// per-weekday counts of this week's fulfillments.
    pub fn week_fulfillments(&self, study_id: StudyId) -> HabitServiceResult<Vec<WeekHabit>> {
        let week = BucketFilter::week(self.calendar.current_bucket().week_key());
        let habits = self.repo.find_habits(&HabitFilter::study(
            study_id,
            ActiveFilter::ActiveOrFulfilledIn(week),
        ))?;

        let mut grouped: HashMap<HabitId, Vec<HabitFulfillment>> = HashMap::new();
        for fulfillment in self.load_fulfillments(study_id, week, &habits)? {
            grouped
                .entry(fulfillment.habit_id)
                .or_default()
                .push(fulfillment);
        }

        Ok(habits
            .into_iter()
            .map(|habit| {
                let week_fulfillments = grouped.remove(&habit.habit_id).unwrap_or_default();
                summarize_week(habit, week_fulfillments)
            })
            .collect())
    }

    /// Records one fulfillment of an active habit in today's bucket.
    pub fn create_fulfillment_today(
        &self,
        study_id: StudyId,
        habit_id: HabitId,
    ) -> HabitServiceResult<HabitFulfillment> {
        let habit = self.require_habit(study_id, habit_id)?;
        if !habit.is_active() {
            return Err(HabitServiceError::NotFound {
                entity: "habit",
                id: habit_id,
            });
        }

        let bucket = self.calendar.current_bucket();
        let fulfillment = self.repo.create_fulfillment(habit_id, study_id, bucket)?;
        info!(
            "event=fulfillment_create module=service status=ok study_id={study_id} habit_id={habit_id} year={} week={} weekday={}",
            bucket.year, bucket.week, bucket.weekday
        );
        Ok(fulfillment)
    }

    /// Deletes one fulfillment by id.
    pub fn delete_fulfillment(&self, fulfillment_id: FulfillmentId) -> HabitServiceResult<()> {
        self.repo.delete_fulfillment(fulfillment_id)?;
        Ok(())
    }

    /// Creates habits for names not yet held by any habit of the study.
    ///
    /// Removed habits also count as holders. Repeated names in the request
    /// are created once.
    pub fn create_habits(
        &self,
        study_id: StudyId,
        names: &[String],
    ) -> HabitServiceResult<CreateHabitsOutcome> {
        if let Some(blank) = names.iter().find(|name| name.trim().is_empty()) {
            return Err(HabitServiceError::InvalidInput(format!(
                "habit name must not be blank: `{blank}`"
            )));
        }

        let mut seen = HashSet::new();
        let requested: Vec<String> = names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();
        if requested.is_empty() {
            return Ok(CreateHabitsOutcome::default());
        }

        let outcome = self.repo.run_in_transaction(|repo| {
            let holders: HashSet<String> = repo
                .find_habits(
                    &HabitFilter::study(study_id, ActiveFilter::Any).with_names(requested.clone()),
                )?
                .into_iter()
                .map(|habit| habit.habit_name)
                .collect();

            let mut outcome = CreateHabitsOutcome::default();
            for name in &requested {
                if holders.contains(name) {
                    outcome.skipped.push(name.clone());
                } else {
                    outcome.created.push(repo.create_habit(study_id, name)?);
                }
            }
            outcome.total_created = outcome.created.len();
            Ok(outcome)
        })?;

        info!(
            "event=habit_create module=service status=ok study_id={study_id} created={} skipped={}",
            outcome.total_created,
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    /// Lists the study's active habits, newest first.
    pub fn list_habits(&self, study_id: StudyId) -> HabitServiceResult<Vec<Habit>> {
        Ok(self
            .repo
            .find_habits(&HabitFilter::study(study_id, ActiveFilter::ActiveOnly).newest_first())?)
    }

    /// Lists active habits of every study, newest first.
    pub fn list_all_habits(&self) -> HabitServiceResult<Vec<Habit>> {
        Ok(self
            .repo
            .find_habits(&HabitFilter::all(ActiveFilter::ActiveOnly).newest_first())?)
    }

    /// Renames one habit of the study.
    ///
    /// Fails with `InvalidInput` when another active habit of the study
    /// already uses the name.
    pub fn update_habit(
        &self,
        study_id: StudyId,
        habit_id: HabitId,
        habit_name: &str,
    ) -> HabitServiceResult<Habit> {
        if habit_name.trim().is_empty() {
            return Err(HabitServiceError::InvalidInput(
                "habit name must not be blank".to_string(),
            ));
        }

        let renamed = self.repo.run_in_transaction(|repo| {
            let habit = scoped_habit(repo, study_id, habit_id)?;
            if habit.habit_name == habit_name {
                return Ok(habit);
            }
            if habit.is_active() {
                let holders = repo.find_habits(
                    &HabitFilter::study(study_id, ActiveFilter::ActiveOnly)
                        .with_names(vec![habit_name.to_string()]),
                )?;
                if holders.iter().any(|holder| holder.habit_id != habit_id) {
                    return Err(RepoError::Conflict(format!(
                        "habit name `{habit_name}` is already used in study {study_id}"
                    )));
                }
            }
            repo.rename_habit(habit_id, habit_name)
        })?;

        Ok(renamed)
    }

    /// Hard-deletes one habit of the study, cascading to its fulfillments.
    pub fn delete_habit(&self, study_id: StudyId, habit_id: HabitId) -> HabitServiceResult<()> {
        self.repo.run_in_transaction(|repo| {
            scoped_habit(repo, study_id, habit_id)?;
            repo.delete_habit(habit_id)
        })?;
        info!("event=habit_delete module=service status=ok study_id={study_id} habit_id={habit_id}");
        Ok(())
    }

    /// Reconciles the study's habits with a desired roster.
    pub fn reconcile(
        &self,
        study_id: StudyId,
        desired: &[DesiredHabit],
    ) -> HabitServiceResult<ReconcileOutcome> {
        Ok(reconcile_habits(&self.repo, study_id, desired)?)
    }

    /// Reconciles from wire-shaped entries, skipping entries without a name.
    pub fn reconcile_inputs(
        &self,
        study_id: StudyId,
        entries: Vec<DesiredHabitInput>,
    ) -> HabitServiceResult<ReconcileOutcome> {
        let desired: Vec<DesiredHabit> = entries
            .into_iter()
            .filter_map(DesiredHabitInput::into_desired)
            .collect();
        self.reconcile(study_id, &desired)
    }

    fn require_habit(&self, study_id: StudyId, habit_id: HabitId) -> HabitServiceResult<Habit> {
        Ok(scoped_habit(&self.repo, study_id, habit_id)?)
    }

    fn load_fulfillments(
        &self,
        study_id: StudyId,
        bucket: BucketFilter,
        habits: &[Habit],
    ) -> RepoResult<Vec<HabitFulfillment>> {
        if habits.is_empty() {
            return Ok(Vec::new());
        }
        self.repo.find_fulfillments(
            &FulfillmentFilter::study(study_id, bucket)
                .with_habits(habits.iter().map(|habit| habit.habit_id).collect()),
        )
    }
}

fn scoped_habit<R: HabitRepository>(
    repo: &R,
    study_id: StudyId,
    habit_id: HabitId,
) -> RepoResult<Habit> {
    repo.get_habit(habit_id)?
        .filter(|habit| habit.study_id == study_id)
        .ok_or(RepoError::not_found("habit", habit_id))
}

fn count_by_habit(fulfillments: &[HabitFulfillment]) -> HashMap<HabitId, usize> {
    let mut counts = HashMap::new();
    for fulfillment in fulfillments {
        *counts.entry(fulfillment.habit_id).or_insert(0) += 1;
    }
    counts
}

fn summarize_week(habit: Habit, week_fulfillments: Vec<HabitFulfillment>) -> WeekHabit {
    let mut fulfillment_count_by_day = BTreeMap::new();
    for fulfillment in &week_fulfillments {
        *fulfillment_count_by_day
            .entry(fulfillment.bucket.weekday)
            .or_insert(0) += 1;
    }

    WeekHabit {
        habit_id: habit.habit_id,
        habit_name: habit.habit_name,
        is_removed: habit.is_removed,
        total_fulfillment_count: week_fulfillments.len(),
        fulfillment_count_by_day,
        week_fulfillments,
    }
}

#[cfg(test)]
mod tests {
    use super::summarize_week;
    use crate::model::habit::{FulfillmentBucket, Habit, HabitFulfillment};

    fn fulfillment(fulfillment_id: i64, weekday: u32) -> HabitFulfillment {
        HabitFulfillment {
            fulfillment_id,
            habit_id: 1,
            study_id: 1,
            bucket: FulfillmentBucket {
                year: 2024,
                week: 10,
                weekday,
            },
            created_at: 0,
        }
    }

    #[test]
    fn week_summary_groups_by_weekday() {
        let habit = Habit {
            habit_id: 1,
            study_id: 1,
            habit_name: "Run".to_string(),
            is_removed: false,
            created_at: 0,
            updated_at: 0,
        };
        let summary = summarize_week(
            habit,
            vec![fulfillment(1, 1), fulfillment(2, 1), fulfillment(3, 4)],
        );

        assert_eq!(summary.total_fulfillment_count, 3);
        assert_eq!(summary.fulfillment_count_by_day.get(&1), Some(&2));
        assert_eq!(summary.fulfillment_count_by_day.get(&4), Some(&1));
        assert_eq!(summary.fulfillment_count_by_day.len(), 2);
    }
}
