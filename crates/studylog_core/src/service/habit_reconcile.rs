//! Batch reconciliation of a study's habit roster.
//!
//! # Responsibility
//! - Diff a client-submitted desired roster against the study's active
//!   habits and derive the creates, renames and soft-deletes that make the
//!   store match it.
//! - Apply the resulting plan atomically through `HabitRepository`.
//!
//! # Invariants
//! - Entries are resolved in submission order; the first entry that claims
//!   a name wins it. A habit kept by an earlier entry may still be renamed
//!   or lose its name to a later one.
//! - After apply, active habit names of the study are unique.
//! - Every habit active before the batch ends up in exactly one of
//!   `unchanged`, `updated` or `removed`, reflecting its final state.
//! - Reconciliation never hard-deletes and never resurrects removed habits.

use crate::model::habit::{DesiredHabit, Habit, HabitId};
use crate::model::study::StudyId;
use crate::repo::habit_repo::{ActiveFilter, HabitFilter, HabitRepository};
use crate::repo::{RepoError, RepoResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Categorized result of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub created: Vec<Habit>,
    pub updated: Vec<Habit>,
    pub removed: Vec<HabitId>,
    pub unchanged: Vec<Habit>,
}

/// One store mutation (or non-mutation) decided by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedChange {
    Keep(HabitId),
    Rename { habit_id: HabitId, name: String },
    Remove(HabitId),
    Create { name: String },
}

/// Loads, plans and applies one reconciliation inside a single transaction.
pub fn reconcile_habits<R: HabitRepository>(
    repo: &R,
    study_id: StudyId,
    desired: &[DesiredHabit],
) -> RepoResult<ReconcileOutcome> {
    let started_at = Instant::now();
    info!(
        "event=habit_reconcile module=service status=start study_id={study_id} entries={}",
        desired.len()
    );

    let outcome = repo.run_in_transaction(|repo| {
        let active = repo.find_habits(&HabitFilter::study(study_id, ActiveFilter::ActiveOnly))?;
        let plan = plan_reconciliation(study_id, &active, desired);
        apply_plan(repo, study_id, &active, plan)
    })?;

    info!(
        "event=habit_reconcile module=service status=ok study_id={study_id} created={} updated={} removed={} unchanged={} duration_ms={}",
        outcome.created.len(),
        outcome.updated.len(),
        outcome.removed.len(),
        outcome.unchanged.len(),
        started_at.elapsed().as_millis()
    );
    Ok(outcome)
}

/// Computes the ordered change list turning `active` into `desired`.
///
/// `active` should hold the study's active habits in store order; entries
/// owned by another study or already removed are ignored.
pub fn plan_reconciliation(
    study_id: StudyId,
    active: &[Habit],
    desired: &[DesiredHabit],
) -> Vec<PlannedChange> {
    let mut planner = Planner::new(study_id, active);
    for entry in desired {
        match entry {
            DesiredHabit::ById { habit_id, name } => planner.resolve_by_id(*habit_id, name),
            DesiredHabit::ByName { name } => planner.resolve_by_name(name),
        }
    }
    planner.finish()
}

struct Planner<'a> {
    roster: Vec<&'a Habit>,
    /// Current name of every habit still active in this batch.
    current_names: HashMap<HabitId, String>,
    by_name: HashMap<String, HabitId>,
    /// Habits the final sweep must leave active.
    claimed: HashSet<HabitId>,
    removed: HashSet<HabitId>,
    /// Names already satisfied in this batch; `None` marks a pending create.
    assigned: HashMap<String, Option<HabitId>>,
    changes: Vec<PlannedChange>,
}

impl<'a> Planner<'a> {
    fn new(study_id: StudyId, active: &'a [Habit]) -> Self {
        let roster: Vec<&Habit> = active
            .iter()
            .filter(|habit| habit.study_id == study_id && habit.is_active())
            .collect();
        let mut current_names = HashMap::with_capacity(roster.len());
        let mut by_name = HashMap::with_capacity(roster.len());
        for habit in &roster {
            current_names.insert(habit.habit_id, habit.habit_name.clone());
            by_name
                .entry(habit.habit_name.clone())
                .or_insert(habit.habit_id);
        }

        Self {
            roster,
            current_names,
            by_name,
            claimed: HashSet::new(),
            removed: HashSet::new(),
            assigned: HashMap::new(),
            changes: Vec::new(),
        }
    }

    fn resolve_by_id(&mut self, habit_id: HabitId, name: &str) {
        let Some(current) = self.current_names.get(&habit_id).cloned() else {
            debug!("event=habit_reconcile_skip module=service reason=unknown_id habit_id={habit_id}");
            return;
        };

        if current == name {
            self.keep(habit_id, name);
            return;
        }

        if self.assigned.contains_key(name) {
            self.remove(habit_id);
            return;
        }

        if let Some(&holder) = self.by_name.get(name) {
            self.remove(habit_id);
            self.keep(holder, name);
            return;
        }

        self.rename(habit_id, &current, name);
    }

    fn resolve_by_name(&mut self, name: &str) {
        if self.assigned.contains_key(name) {
            return;
        }

        if let Some(&holder) = self.by_name.get(name) {
            self.keep(holder, name);
            return;
        }

        self.assigned.insert(name.to_string(), None);
        self.changes.push(PlannedChange::Create {
            name: name.to_string(),
        });
    }

    fn keep(&mut self, habit_id: HabitId, name: &str) {
        self.assigned.insert(name.to_string(), Some(habit_id));
        if self.claimed.insert(habit_id) {
            self.changes.push(PlannedChange::Keep(habit_id));
        }
    }

    fn drop_keep(&mut self, habit_id: HabitId) {
        self.changes
            .retain(|change| *change != PlannedChange::Keep(habit_id));
    }

    fn rename(&mut self, habit_id: HabitId, current: &str, name: &str) {
        if self.by_name.get(current) == Some(&habit_id) {
            self.by_name.remove(current);
        }
        self.by_name.insert(name.to_string(), habit_id);
        self.current_names.insert(habit_id, name.to_string());
        self.drop_keep(habit_id);
        self.claimed.insert(habit_id);
        self.assigned.insert(name.to_string(), Some(habit_id));
        self.changes.push(PlannedChange::Rename {
            habit_id,
            name: name.to_string(),
        });
    }

    fn remove(&mut self, habit_id: HabitId) {
        if let Some(current) = self.current_names.remove(&habit_id) {
            if self.by_name.get(&current) == Some(&habit_id) {
                self.by_name.remove(&current);
            }
        }
        self.drop_keep(habit_id);
        self.claimed.remove(&habit_id);
        self.removed.insert(habit_id);
        self.changes.push(PlannedChange::Remove(habit_id));
    }

    fn finish(mut self) -> Vec<PlannedChange> {
        let leftovers: Vec<HabitId> = self
            .roster
            .iter()
            .map(|habit| habit.habit_id)
            .filter(|habit_id| !self.claimed.contains(habit_id) && !self.removed.contains(habit_id))
            .collect();
        for habit_id in leftovers {
            self.remove(habit_id);
        }
        self.changes
    }
}

fn apply_plan<R: HabitRepository>(
    repo: &R,
    study_id: StudyId,
    active: &[Habit],
    plan: Vec<PlannedChange>,
) -> RepoResult<ReconcileOutcome> {
    let loaded: HashMap<HabitId, &Habit> =
        active.iter().map(|habit| (habit.habit_id, habit)).collect();
    let mut outcome = ReconcileOutcome::default();

    for change in plan {
        match change {
            PlannedChange::Keep(habit_id) => {
                let habit = loaded.get(&habit_id).ok_or_else(|| {
                    RepoError::InvalidData(format!("planned habit {habit_id} was not loaded"))
                })?;
                outcome.unchanged.push((*habit).clone());
            }
            PlannedChange::Rename { habit_id, name } => {
                let renamed = repo.rename_habit(habit_id, &name)?;
                outcome.updated.retain(|habit| habit.habit_id != habit_id);
                outcome.updated.push(renamed);
            }
            PlannedChange::Remove(habit_id) => {
                repo.soft_delete_habit(habit_id)?;
                outcome.updated.retain(|habit| habit.habit_id != habit_id);
                outcome.removed.push(habit_id);
            }
            PlannedChange::Create { name } => {
                outcome.created.push(repo.create_habit(study_id, &name)?);
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{plan_reconciliation, PlannedChange};
    use crate::model::habit::{DesiredHabit, Habit};

    const STUDY: i64 = 7;

    fn habit(habit_id: i64, name: &str) -> Habit {
        Habit {
            habit_id,
            study_id: STUDY,
            habit_name: name.to_string(),
            is_removed: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn by_id(habit_id: i64, name: &str) -> DesiredHabit {
        DesiredHabit::ById {
            habit_id,
            name: name.to_string(),
        }
    }

    fn by_name(name: &str) -> DesiredHabit {
        DesiredHabit::ByName {
            name: name.to_string(),
        }
    }

    #[test]
    fn renames_to_same_name_collapse_onto_first_entry() {
        let active = [habit(1, "A"), habit(2, "B")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(1, "X"), by_id(2, "X")]);
        assert_eq!(
            plan,
            vec![
                PlannedChange::Rename {
                    habit_id: 1,
                    name: "X".to_string()
                },
                PlannedChange::Remove(2),
            ]
        );
    }

    #[test]
    fn rename_onto_existing_name_keeps_the_holder() {
        let active = [habit(1, "A"), habit(2, "B")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(2, "A")]);
        assert_eq!(plan, vec![PlannedChange::Remove(2), PlannedChange::Keep(1)]);
    }

    #[test]
    fn resubmitting_current_roster_keeps_everything() {
        let active = [habit(1, "A"), habit(2, "B")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(1, "A"), by_name("B")]);
        assert_eq!(plan, vec![PlannedChange::Keep(1), PlannedChange::Keep(2)]);
    }

    #[test]
    fn missing_habits_are_swept_after_entries() {
        let active = [habit(1, "A"), habit(2, "B"), habit(3, "C")];
        let plan = plan_reconciliation(STUDY, &active, &[by_name("B"), by_name("D")]);
        assert_eq!(
            plan,
            vec![
                PlannedChange::Keep(2),
                PlannedChange::Create {
                    name: "D".to_string()
                },
                PlannedChange::Remove(1),
                PlannedChange::Remove(3),
            ]
        );
    }

    #[test]
    fn duplicate_bare_names_create_once() {
        let plan = plan_reconciliation(STUDY, &[], &[by_name("Run"), by_name("Run")]);
        assert_eq!(
            plan,
            vec![PlannedChange::Create {
                name: "Run".to_string()
            }]
        );
    }

    #[test]
    fn stale_and_foreign_ids_are_ignored() {
        let mut foreign = habit(9, "A");
        foreign.study_id = STUDY + 1;
        let mut removed = habit(4, "Old");
        removed.is_removed = true;
        let active = [habit(1, "A"), foreign, removed];

        let plan = plan_reconciliation(
            STUDY,
            &active,
            &[by_id(9, "Hijack"), by_id(4, "Old"), by_id(1, "A")],
        );
        assert_eq!(plan, vec![PlannedChange::Keep(1)]);
    }

    #[test]
    fn freed_name_can_be_reused_by_name_after_rename() {
        let active = [habit(1, "A")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(1, "B"), by_name("A")]);
        assert_eq!(
            plan,
            vec![
                PlannedChange::Rename {
                    habit_id: 1,
                    name: "B".to_string()
                },
                PlannedChange::Create {
                    name: "A".to_string()
                },
            ]
        );
    }

    #[test]
    fn habit_kept_by_name_can_still_be_renamed_later() {
        let active = [habit(1, "A")];
        let plan = plan_reconciliation(STUDY, &active, &[by_name("A"), by_id(1, "B")]);
        assert_eq!(
            plan,
            vec![PlannedChange::Rename {
                habit_id: 1,
                name: "B".to_string()
            }]
        );
    }

    #[test]
    fn swapped_names_remove_the_first_and_rename_the_holder() {
        let active = [habit(1, "A"), habit(2, "B")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(1, "B"), by_id(2, "A")]);
        assert_eq!(
            plan,
            vec![
                PlannedChange::Remove(1),
                PlannedChange::Rename {
                    habit_id: 2,
                    name: "A".to_string()
                },
            ]
        );
    }

    #[test]
    fn holder_kept_by_a_losing_rename_is_renamed_by_its_own_entry() {
        let active = [habit(1, "A"), habit(2, "B")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(2, "A"), by_id(1, "Z")]);
        assert_eq!(
            plan,
            vec![
                PlannedChange::Remove(2),
                PlannedChange::Rename {
                    habit_id: 1,
                    name: "Z".to_string()
                },
            ]
        );
    }

    #[test]
    fn repeated_entry_for_the_same_habit_keeps_it_once() {
        let active = [habit(1, "A")];
        let plan = plan_reconciliation(STUDY, &active, &[by_id(1, "A"), by_id(1, "A")]);
        assert_eq!(plan, vec![PlannedChange::Keep(1)]);
    }
}
