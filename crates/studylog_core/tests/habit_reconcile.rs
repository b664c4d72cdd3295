use rusqlite::Connection;
use std::collections::HashSet;
use studylog_core::db::open_db_in_memory;
use studylog_core::repo::habit_repo::{ActiveFilter, HabitFilter};
use studylog_core::{
    reconcile_habits, Calendar, DesiredHabit, DesiredHabitInput, Habit, HabitRepository,
    HabitService, ReconcileOutcome, RepoError, SqliteHabitRepository, StudyId,
};

fn seed_study(conn: &Connection, name: &str) -> StudyId {
    conn.execute(
        "INSERT INTO studies (nickname, study_name) VALUES ('tester', ?1);",
        [name],
    )
    .unwrap();
    conn.last_insert_rowid()
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

fn active_habits(repo: &SqliteHabitRepository<'_>, study_id: StudyId) -> Vec<Habit> {
    repo.find_habits(&HabitFilter::study(study_id, ActiveFilter::ActiveOnly))
        .unwrap()
}

fn ids(habits: &[Habit]) -> Vec<i64> {
    habits.iter().map(|habit| habit.habit_id).collect()
}

#[test]
fn duplicate_renames_collapse_to_first_entry() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "collapse");
    let repo = SqliteHabitRepository::new(&conn);
    let a = repo.create_habit(study, "A").unwrap();
    let b = repo.create_habit(study, "B").unwrap();

    let outcome = reconcile_habits(
        &repo,
        study,
        &[by_id(a.habit_id, "X"), by_id(b.habit_id, "X")],
    )
    .unwrap();

    assert_eq!(ids(&outcome.updated), vec![a.habit_id]);
    assert_eq!(outcome.updated[0].habit_name, "X");
    assert_eq!(outcome.removed, vec![b.habit_id]);
    assert!(outcome.created.is_empty());
    assert!(outcome.unchanged.is_empty());

    let removed = repo.get_habit(b.habit_id).unwrap().unwrap();
    assert!(removed.is_removed);
}

#[test]
fn resubmitting_the_same_roster_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "idempotent");
    let repo = SqliteHabitRepository::new(&conn);
    let run = repo.create_habit(study, "Run").unwrap();
    repo.create_habit(study, "Stretch").unwrap();

    let desired = [by_id(run.habit_id, "Jog"), by_name("Read"), by_name("Read")];
    let first = reconcile_habits(&repo, study, &desired).unwrap();
    assert_eq!(first.updated.len(), 1);
    assert_eq!(first.created.len(), 1);
    assert_eq!(first.removed.len(), 1);

    let second = reconcile_habits(&repo, study, &desired).unwrap();
    assert!(second.created.is_empty());
    assert!(second.updated.is_empty());
    assert!(second.removed.is_empty());

    let mut unchanged: Vec<String> = second
        .unchanged
        .iter()
        .map(|habit| habit.habit_name.clone())
        .collect();
    unchanged.sort();
    assert_eq!(unchanged, vec!["Jog".to_string(), "Read".to_string()]);
}

#[test]
fn every_prior_habit_is_accounted_for_and_names_stay_unique() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "conservation");
    let repo = SqliteHabitRepository::new(&conn);
    let before: Vec<Habit> = ["A", "B", "C", "D"]
        .iter()
        .map(|name| repo.create_habit(study, name).unwrap())
        .collect();

    let outcome = reconcile_habits(
        &repo,
        study,
        &[
            by_id(before[0].habit_id, "B"),
            by_id(before[2].habit_id, "E"),
            by_name("A"),
            by_id(before[3].habit_id, "E"),
            by_name("F"),
        ],
    )
    .unwrap();

    let mut accounted: HashSet<i64> = outcome.removed.iter().copied().collect();
    accounted.extend(ids(&outcome.unchanged));
    accounted.extend(ids(&outcome.updated));
    for habit in &before {
        assert!(accounted.contains(&habit.habit_id), "habit {habit:?} vanished");
    }

    let active = active_habits(&repo, study);
    let names: HashSet<&str> = active.iter().map(|habit| habit.habit_name.as_str()).collect();
    assert_eq!(names.len(), active.len());
    assert_eq!(
        names,
        ["A", "B", "E", "F"].into_iter().collect::<HashSet<_>>()
    );
}

#[test]
fn swapping_two_names_keeps_one_habit_under_the_second_name() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "swap");
    let repo = SqliteHabitRepository::new(&conn);
    let a = repo.create_habit(study, "A").unwrap();
    let b = repo.create_habit(study, "B").unwrap();

    let outcome = reconcile_habits(
        &repo,
        study,
        &[by_id(a.habit_id, "B"), by_id(b.habit_id, "A")],
    )
    .unwrap();

    assert_eq!(outcome.removed, vec![a.habit_id]);
    assert_eq!(ids(&outcome.updated), vec![b.habit_id]);
    assert_eq!(outcome.updated[0].habit_name, "A");
    assert!(outcome.unchanged.is_empty());

    let active = active_habits(&repo, study);
    assert_eq!(ids(&active), vec![b.habit_id]);
    assert_eq!(active[0].habit_name, "A");
}

#[test]
fn name_holder_is_renamed_by_its_own_later_entry() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "holder");
    let repo = SqliteHabitRepository::new(&conn);
    let a = repo.create_habit(study, "A").unwrap();
    let b = repo.create_habit(study, "B").unwrap();

    let outcome = reconcile_habits(
        &repo,
        study,
        &[by_id(b.habit_id, "A"), by_id(a.habit_id, "Z")],
    )
    .unwrap();

    assert_eq!(outcome.removed, vec![b.habit_id]);
    assert_eq!(ids(&outcome.updated), vec![a.habit_id]);
    assert!(outcome.unchanged.is_empty());
    assert_eq!(
        repo.get_habit(a.habit_id).unwrap().unwrap().habit_name,
        "Z"
    );
}

#[test]
fn renamed_habit_that_later_loses_is_only_reported_removed() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "late loser");
    let repo = SqliteHabitRepository::new(&conn);
    let a = repo.create_habit(study, "A").unwrap();
    let b = repo.create_habit(study, "B").unwrap();

    let outcome = reconcile_habits(
        &repo,
        study,
        &[
            by_id(a.habit_id, "X"),
            by_id(b.habit_id, "Y"),
            by_id(a.habit_id, "Y"),
        ],
    )
    .unwrap();

    assert_eq!(ids(&outcome.updated), vec![b.habit_id]);
    assert_eq!(outcome.removed, vec![a.habit_id]);
    assert!(repo.get_habit(a.habit_id).unwrap().unwrap().is_removed);
}

#[test]
fn removed_habit_is_not_resurrected_by_name() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "resurrection");
    let repo = SqliteHabitRepository::new(&conn);
    let old = repo.create_habit(study, "Run").unwrap();
    repo.soft_delete_habit(old.habit_id).unwrap();

    let outcome = reconcile_habits(&repo, study, &[by_name("Run")]).unwrap();

    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].habit_name, "Run");
    assert_ne!(outcome.created[0].habit_id, old.habit_id);
    assert!(repo.get_habit(old.habit_id).unwrap().unwrap().is_removed);
}

#[test]
fn ids_of_other_studies_are_ignored() {
    let conn = open_db_in_memory().unwrap();
    let mine = seed_study(&conn, "mine");
    let theirs = seed_study(&conn, "theirs");
    let repo = SqliteHabitRepository::new(&conn);
    let foreign = repo.create_habit(theirs, "Swim").unwrap();

    let outcome = reconcile_habits(&repo, mine, &[by_id(foreign.habit_id, "Hijacked")]).unwrap();

    assert_eq!(outcome, ReconcileOutcome::default());
    let untouched = repo.get_habit(foreign.habit_id).unwrap().unwrap();
    assert_eq!(untouched.habit_name, "Swim");
    assert!(!untouched.is_removed);
}

#[test]
fn failure_mid_batch_rolls_everything_back() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "rollback");
    let repo = SqliteHabitRepository::new(&conn);
    let a = repo.create_habit(study, "A").unwrap();
    repo.create_habit(study, "B").unwrap();

    conn.execute_batch(
        "CREATE TRIGGER reject_broken BEFORE INSERT ON habits
         WHEN NEW.habit_name = 'Broken'
         BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
    )
    .unwrap();

    let err = reconcile_habits(
        &repo,
        study,
        &[by_id(a.habit_id, "Renamed"), by_name("Broken")],
    )
    .unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));

    let names: Vec<String> = active_habits(&repo, study)
        .into_iter()
        .map(|habit| habit.habit_name)
        .collect();
    assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    assert!(conn.is_autocommit());
}

#[test]
fn service_skips_wire_entries_without_names() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn, "wire");
    let service = HabitService::new(
        SqliteHabitRepository::new(&conn),
        Calendar::from_config(&Default::default()).unwrap(),
    );
    let entries: Vec<DesiredHabitInput> =
        serde_json::from_str(r#"[{"habit_name": "Read"}, {"habit_pk": 9}, {"habit_name": ""}]"#)
            .unwrap();

    let outcome = service.reconcile_inputs(study, entries).unwrap();

    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].habit_name, "Read");
    assert!(outcome.removed.is_empty());
}
