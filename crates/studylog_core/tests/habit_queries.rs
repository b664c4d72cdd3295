use chrono::{FixedOffset, TimeZone, Utc};
use rusqlite::Connection;
use studylog_core::db::open_db_in_memory;
use studylog_core::{
    Calendar, FixedClock, FulfillmentBucket, HabitRepository, HabitService, HabitServiceError,
    SqliteHabitRepository, StudyId,
};

/// Wednesday 2024-03-06 00:00 at +09:00, ISO week 10.
fn wednesday_calendar() -> Calendar<FixedClock> {
    Calendar::new(
        FixedOffset::east_opt(9 * 3600).unwrap(),
        FixedClock(Utc.with_ymd_and_hms(2024, 3, 5, 15, 0, 0).unwrap()),
    )
}

fn bucket(week: u32, weekday: u32) -> FulfillmentBucket {
    FulfillmentBucket {
        year: 2024,
        week,
        weekday,
    }
}

fn seed_study(conn: &Connection) -> StudyId {
    conn.execute(
        "INSERT INTO studies (nickname, study_name) VALUES ('tester', 'queries');",
        [],
    )
    .unwrap();
    conn.last_insert_rowid()
}

fn service(conn: &Connection) -> HabitService<SqliteHabitRepository<'_>, FixedClock> {
    HabitService::new(SqliteHabitRepository::new(conn), wednesday_calendar())
}

#[test]
fn calendar_buckets_the_pinned_instant() {
    assert_eq!(wednesday_calendar().current_bucket(), bucket(9, 3));
}

#[test]
fn today_lists_only_habits_fulfilled_today() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let repo = SqliteHabitRepository::new(&conn);
    let run = repo.create_habit(study, "Run").unwrap();
    let read = repo.create_habit(study, "Read").unwrap();
    repo.create_habit(study, "Swim").unwrap();
    repo.create_fulfillment(read.habit_id, study, bucket(9, 2))
        .unwrap();

    let habits = service(&conn);
    habits.create_fulfillment_today(study, run.habit_id).unwrap();
    habits.create_fulfillment_today(study, run.habit_id).unwrap();

    let today = habits.today_habits(study).unwrap();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].habit_id, run.habit_id);
    assert_eq!(today[0].habit_name, "Run");
    assert!(today[0].has_fulfillment);
    assert_eq!(today[0].fulfillment_count, 2);
}

#[test]
fn today_leaves_out_removed_habits_fulfilled_today() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let repo = SqliteHabitRepository::new(&conn);
    let kept = repo.create_habit(study, "Kept").unwrap();
    let dropped = repo.create_habit(study, "Dropped").unwrap();

    let habits = service(&conn);
    habits.create_fulfillment_today(study, kept.habit_id).unwrap();
    habits
        .create_fulfillment_today(study, dropped.habit_id)
        .unwrap();
    repo.soft_delete_habit(dropped.habit_id).unwrap();

    let today = habits.today_habits(study).unwrap();
    let ids: Vec<i64> = today.iter().map(|habit| habit.habit_id).collect();
    assert_eq!(ids, vec![kept.habit_id]);
}

#[test]
fn week_groups_by_weekday_and_keeps_recently_removed_habits() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let repo = SqliteHabitRepository::new(&conn);
    let run = repo.create_habit(study, "Run").unwrap();
    let fresh = repo.create_habit(study, "Fresh").unwrap();
    let retired = repo.create_habit(study, "Retired").unwrap();
    let forgotten = repo.create_habit(study, "Forgotten").unwrap();

    repo.create_fulfillment(run.habit_id, study, bucket(9, 1))
        .unwrap();
    repo.create_fulfillment(run.habit_id, study, bucket(9, 1))
        .unwrap();
    repo.create_fulfillment(run.habit_id, study, bucket(8, 1))
        .unwrap();
    repo.create_fulfillment(retired.habit_id, study, bucket(9, 4))
        .unwrap();
    repo.create_fulfillment(forgotten.habit_id, study, bucket(8, 4))
        .unwrap();
    repo.soft_delete_habit(retired.habit_id).unwrap();
    repo.soft_delete_habit(forgotten.habit_id).unwrap();

    let week = service(&conn).week_fulfillments(study).unwrap();
    let ids: Vec<i64> = week.iter().map(|habit| habit.habit_id).collect();
    assert_eq!(ids, vec![run.habit_id, fresh.habit_id, retired.habit_id]);

    let run_week = &week[0];
    assert_eq!(run_week.total_fulfillment_count, 2);
    assert_eq!(
        run_week.fulfillment_count_by_day.iter().collect::<Vec<_>>(),
        vec![(&1, &2)]
    );
    assert!(run_week
        .week_fulfillments
        .iter()
        .all(|fulfillment| fulfillment.bucket.week == 9));

    assert_eq!(week[1].total_fulfillment_count, 0);
    assert!(week[1].fulfillment_count_by_day.is_empty());

    assert!(week[2].is_removed);
    assert_eq!(week[2].fulfillment_count_by_day.get(&4), Some(&1));
}

#[test]
fn fulfilling_requires_an_active_habit_of_the_study() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let other = seed_study(&conn);
    let repo = SqliteHabitRepository::new(&conn);
    let removed = repo.create_habit(study, "Old").unwrap();
    repo.soft_delete_habit(removed.habit_id).unwrap();
    let foreign = repo.create_habit(other, "Theirs").unwrap();

    let habits = service(&conn);
    assert!(matches!(
        habits.create_fulfillment_today(study, removed.habit_id),
        Err(HabitServiceError::NotFound { entity: "habit", .. })
    ));
    assert!(matches!(
        habits.create_fulfillment_today(study, foreign.habit_id),
        Err(HabitServiceError::NotFound { .. })
    ));
    assert!(matches!(
        habits.delete_fulfillment(404),
        Err(HabitServiceError::NotFound { .. })
    ));
}

#[test]
fn fulfillment_is_stored_in_the_calendar_bucket_and_can_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let run = SqliteHabitRepository::new(&conn)
        .create_habit(study, "Run")
        .unwrap();

    let habits = service(&conn);
    let fulfillment = habits.create_fulfillment_today(study, run.habit_id).unwrap();
    assert_eq!(fulfillment.bucket, bucket(9, 3));
    assert_eq!(fulfillment.study_id, study);

    habits.delete_fulfillment(fulfillment.fulfillment_id).unwrap();
    assert!(habits.today_habits(study).unwrap().is_empty());
}

#[test]
fn plain_creation_skips_names_held_by_any_habit() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let repo = SqliteHabitRepository::new(&conn);
    repo.create_habit(study, "Run").unwrap();
    let retired = repo.create_habit(study, "Swim").unwrap();
    repo.soft_delete_habit(retired.habit_id).unwrap();

    let names: Vec<String> = ["Run", "Swim", "Read", "Read"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    let outcome = service(&conn).create_habits(study, &names).unwrap();

    assert_eq!(outcome.total_created, 1);
    assert_eq!(outcome.created[0].habit_name, "Read");
    assert_eq!(outcome.skipped, vec!["Run".to_string(), "Swim".to_string()]);

    assert!(matches!(
        service(&conn).create_habits(study, &["  ".to_string()]),
        Err(HabitServiceError::InvalidInput(_))
    ));
}

#[test]
fn rename_rejects_active_name_conflicts() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let repo = SqliteHabitRepository::new(&conn);
    let run = repo.create_habit(study, "Run").unwrap();
    repo.create_habit(study, "Read").unwrap();

    let habits = service(&conn);
    assert!(matches!(
        habits.update_habit(study, run.habit_id, "Read"),
        Err(HabitServiceError::InvalidInput(_))
    ));
    let renamed = habits.update_habit(study, run.habit_id, "Jog").unwrap();
    assert_eq!(renamed.habit_name, "Jog");

    let listed: Vec<String> = habits
        .list_habits(study)
        .unwrap()
        .into_iter()
        .map(|habit| habit.habit_name)
        .collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&"Jog".to_string()));
}

#[test]
fn hard_delete_cascades_to_fulfillments() {
    let conn = open_db_in_memory().unwrap();
    let study = seed_study(&conn);
    let run = SqliteHabitRepository::new(&conn)
        .create_habit(study, "Run")
        .unwrap();

    let habits = service(&conn);
    habits.create_fulfillment_today(study, run.habit_id).unwrap();
    habits.delete_habit(study, run.habit_id).unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM habit_fulfillments;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(matches!(
        habits.delete_habit(study, run.habit_id),
        Err(HabitServiceError::NotFound { .. })
    ));
}
