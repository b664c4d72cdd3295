//! Habit/fulfillment repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the query contract the habit services depend on: filtered habit
//!   lookup, bucketed fulfillment lookup, single-row mutations and a
//!   transaction scope.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Habit queries never default their active filter; callers choose
//!   `ActiveOnly`, `Any` or `ActiveOrFulfilledIn`.
//! - Soft delete only flips `is_removed`; fulfillments survive it.
//! - Results follow insertion order unless `HabitOrder::NewestFirst` is set.

use crate::model::habit::{
    FulfillmentBucket, FulfillmentId, Habit, HabitFulfillment, HabitId, WeekKey,
};
use crate::model::study::StudyId;
use crate::repo::{
    bool_to_int, parse_bool_column, parse_u32_column, placeholders, with_transaction, RepoError,
    RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const HABIT_SELECT_SQL: &str = "SELECT
    habit_id,
    study_id,
    habit_name,
    is_removed,
    created_at,
    updated_at
FROM habits";

const FULFILLMENT_SELECT_SQL: &str = "SELECT
    fulfillment_id,
    habit_id,
    study_id,
    year,
    week,
    weekday,
    created_at
FROM habit_fulfillments";

/// Calendar slice used to match fulfillments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketFilter {
    pub year: i32,
    pub week: u32,
    /// `None` matches every day of the week.
    pub weekday: Option<u32>,
}

impl BucketFilter {
    /// Matches exactly one day.
    pub fn day(bucket: FulfillmentBucket) -> Self {
        Self {
            year: bucket.year,
            week: bucket.week,
            weekday: Some(bucket.weekday),
        }
    }

    /// Matches a whole week.
    pub fn week(key: WeekKey) -> Self {
        Self {
            year: key.year,
            week: key.week,
            weekday: None,
        }
    }
}

/// Which habits a query considers by removal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveFilter {
    /// `is_removed = 0` only.
    ActiveOnly,
    /// Active and removed habits.
    Any,
    /// Active habits, plus removed ones with a fulfillment in the bucket.
    ActiveOrFulfilledIn(BucketFilter),
}

/// Result ordering for habit queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HabitOrder {
    /// Store natural order (`habit_id ASC`).
    #[default]
    Natural,
    /// `created_at DESC, habit_id DESC`.
    NewestFirst,
}

/// Habit query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitFilter {
    pub study_id: Option<StudyId>,
    pub active: ActiveFilter,
    pub habit_ids: Option<Vec<HabitId>>,
    pub names: Option<Vec<String>>,
    /// Keeps only habits with at least one fulfillment in this bucket.
    pub fulfilled_in: Option<BucketFilter>,
    pub order: HabitOrder,
}

impl HabitFilter {
    /// Habits of one study with the given removal-state intent.
    pub fn study(study_id: StudyId, active: ActiveFilter) -> Self {
        Self {
            study_id: Some(study_id),
            active,
            habit_ids: None,
            names: None,
            fulfilled_in: None,
            order: HabitOrder::Natural,
        }
    }

    /// Habits of every study with the given removal-state intent.
    pub fn all(active: ActiveFilter) -> Self {
        Self {
            study_id: None,
            ..Self::study(0, active)
        }
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn with_ids(mut self, habit_ids: Vec<HabitId>) -> Self {
        self.habit_ids = Some(habit_ids);
        self
    }

    pub fn fulfilled_in(mut self, bucket: BucketFilter) -> Self {
        self.fulfilled_in = Some(bucket);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = HabitOrder::NewestFirst;
        self
    }
}

/// Fulfillment query filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentFilter {
    pub study_id: Option<StudyId>,
    pub habit_ids: Option<Vec<HabitId>>,
    pub bucket: BucketFilter,
}

impl FulfillmentFilter {
    pub fn study(study_id: StudyId, bucket: BucketFilter) -> Self {
        Self {
            study_id: Some(study_id),
            habit_ids: None,
            bucket,
        }
    }

    pub fn with_habits(mut self, habit_ids: Vec<HabitId>) -> Self {
        self.habit_ids = Some(habit_ids);
        self
    }
}

/// Repository interface for habits and fulfillments.
pub trait HabitRepository {
    fn find_habits(&self, filter: &HabitFilter) -> RepoResult<Vec<Habit>>;
    /// Loads one habit regardless of owner or removal state.
    fn get_habit(&self, habit_id: HabitId) -> RepoResult<Option<Habit>>;
    fn find_fulfillments(&self, filter: &FulfillmentFilter) -> RepoResult<Vec<HabitFulfillment>>;
    fn create_habit(&self, study_id: StudyId, habit_name: &str) -> RepoResult<Habit>;
    fn rename_habit(&self, habit_id: HabitId, habit_name: &str) -> RepoResult<Habit>;
    fn soft_delete_habit(&self, habit_id: HabitId) -> RepoResult<()>;
    /// Hard-deletes one habit together with its fulfillments.
    fn delete_habit(&self, habit_id: HabitId) -> RepoResult<()>;
    fn create_fulfillment(
        &self,
        habit_id: HabitId,
        study_id: StudyId,
        bucket: FulfillmentBucket,
    ) -> RepoResult<HabitFulfillment>;
    fn delete_fulfillment(&self, fulfillment_id: FulfillmentId) -> RepoResult<()>;
    /// Runs `f` so that all of its repository calls commit or roll back together.
    fn run_in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> RepoResult<T>;
}

/// SQLite-backed habit repository.
pub struct SqliteHabitRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHabitRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl HabitRepository for SqliteHabitRepository<'_> {
    fn find_habits(&self, filter: &HabitFilter) -> RepoResult<Vec<Habit>> {
        let mut sql = format!("{HABIT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(study_id) = filter.study_id {
            sql.push_str(" AND study_id = ?");
            bind_values.push(Value::Integer(study_id));
        }

        match filter.active {
            ActiveFilter::ActiveOnly => sql.push_str(" AND is_removed = 0"),
            ActiveFilter::Any => {}
            ActiveFilter::ActiveOrFulfilledIn(bucket) => {
                sql.push_str(" AND (is_removed = 0 OR ");
                push_fulfillment_exists(&mut sql, &mut bind_values, bucket);
                sql.push(')');
            }
        }

        if let Some(habit_ids) = filter.habit_ids.as_ref() {
            if habit_ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(
                " AND habit_id IN ({})",
                placeholders(habit_ids.len())
            ));
            bind_values.extend(habit_ids.iter().map(|id| Value::Integer(*id)));
        }

        if let Some(names) = filter.names.as_ref() {
            if names.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(" AND habit_name IN ({})", placeholders(names.len())));
            bind_values.extend(names.iter().map(|name| Value::Text(name.clone())));
        }

        if let Some(bucket) = filter.fulfilled_in {
            sql.push_str(" AND ");
            push_fulfillment_exists(&mut sql, &mut bind_values, bucket);
        }

        sql.push_str(match filter.order {
            HabitOrder::Natural => " ORDER BY habit_id ASC",
            HabitOrder::NewestFirst => " ORDER BY created_at DESC, habit_id DESC",
        });

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut habits = Vec::new();
        while let Some(row) = rows.next()? {
            habits.push(parse_habit_row(row)?);
        }

        Ok(habits)
    }

    fn get_habit(&self, habit_id: HabitId) -> RepoResult<Option<Habit>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{HABIT_SELECT_SQL} WHERE habit_id = ?1;"))?;
        let mut rows = stmt.query([habit_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_habit_row(row)?));
        }

        Ok(None)
    }

    fn find_fulfillments(&self, filter: &FulfillmentFilter) -> RepoResult<Vec<HabitFulfillment>> {
        let mut sql = format!("{FULFILLMENT_SELECT_SQL} WHERE year = ? AND week = ?");
        let mut bind_values: Vec<Value> = vec![
            Value::Integer(i64::from(filter.bucket.year)),
            Value::Integer(i64::from(filter.bucket.week)),
        ];

        if let Some(weekday) = filter.bucket.weekday {
            sql.push_str(" AND weekday = ?");
            bind_values.push(Value::Integer(i64::from(weekday)));
        }

        if let Some(study_id) = filter.study_id {
            sql.push_str(" AND study_id = ?");
            bind_values.push(Value::Integer(study_id));
        }

        if let Some(habit_ids) = filter.habit_ids.as_ref() {
            if habit_ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(
                " AND habit_id IN ({})",
                placeholders(habit_ids.len())
            ));
            bind_values.extend(habit_ids.iter().map(|id| Value::Integer(*id)));
        }

        sql.push_str(" ORDER BY fulfillment_id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut fulfillments = Vec::new();
        while let Some(row) = rows.next()? {
            fulfillments.push(parse_fulfillment_row(row)?);
        }

        Ok(fulfillments)
    }

    fn create_habit(&self, study_id: StudyId, habit_name: &str) -> RepoResult<Habit> {
        self.conn.execute(
            "INSERT INTO habits (study_id, habit_name, is_removed) VALUES (?1, ?2, ?3);",
            params![study_id, habit_name, bool_to_int(false)],
        )?;
        let habit_id = self.conn.last_insert_rowid();
        self.get_habit(habit_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created habit {habit_id} missing in read-back"))
        })
    }

    fn rename_habit(&self, habit_id: HabitId, habit_name: &str) -> RepoResult<Habit> {
        let changed = self.conn.execute(
            "UPDATE habits
             SET
                habit_name = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE habit_id = ?1;",
            params![habit_id, habit_name],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found("habit", habit_id));
        }

        self.get_habit(habit_id)?
            .ok_or(RepoError::not_found("habit", habit_id))
    }

    fn soft_delete_habit(&self, habit_id: HabitId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE habits
             SET
                is_removed = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE habit_id = ?1;",
            [habit_id],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found("habit", habit_id));
        }

        Ok(())
    }

    fn delete_habit(&self, habit_id: HabitId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM habits WHERE habit_id = ?1;", [habit_id])?;

        if changed == 0 {
            return Err(RepoError::not_found("habit", habit_id));
        }

        Ok(())
    }

    fn create_fulfillment(
        &self,
        habit_id: HabitId,
        study_id: StudyId,
        bucket: FulfillmentBucket,
    ) -> RepoResult<HabitFulfillment> {
        self.conn.execute(
            "INSERT INTO habit_fulfillments (habit_id, study_id, year, week, weekday)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![habit_id, study_id, bucket.year, bucket.week, bucket.weekday],
        )?;
        let fulfillment_id = self.conn.last_insert_rowid();

        let mut stmt = self
            .conn
            .prepare(&format!("{FULFILLMENT_SELECT_SQL} WHERE fulfillment_id = ?1;"))?;
        let mut rows = stmt.query([fulfillment_id])?;
        if let Some(row) = rows.next()? {
            return parse_fulfillment_row(row);
        }

        Err(RepoError::InvalidData(format!(
            "created fulfillment {fulfillment_id} missing in read-back"
        )))
    }

    fn delete_fulfillment(&self, fulfillment_id: FulfillmentId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM habit_fulfillments WHERE fulfillment_id = ?1;",
            [fulfillment_id],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found("habit fulfillment", fulfillment_id));
        }

        Ok(())
    }

    fn run_in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&Self) -> RepoResult<T>,
    {
        with_transaction(self.conn, || f(self))
    }
}

fn push_fulfillment_exists(sql: &mut String, bind_values: &mut Vec<Value>, bucket: BucketFilter) {
    sql.push_str(
        "EXISTS (
            SELECT 1
            FROM habit_fulfillments hf
            WHERE hf.habit_id = habits.habit_id
              AND hf.year = ?
              AND hf.week = ?",
    );
    bind_values.push(Value::Integer(i64::from(bucket.year)));
    bind_values.push(Value::Integer(i64::from(bucket.week)));
    if let Some(weekday) = bucket.weekday {
        sql.push_str(" AND hf.weekday = ?");
        bind_values.push(Value::Integer(i64::from(weekday)));
    }
    sql.push(')');
}

fn parse_habit_row(row: &Row<'_>) -> RepoResult<Habit> {
    Ok(Habit {
        habit_id: row.get("habit_id")?,
        study_id: row.get("study_id")?,
        habit_name: row.get("habit_name")?,
        is_removed: parse_bool_column(row, "habits", "is_removed")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_fulfillment_row(row: &Row<'_>) -> RepoResult<HabitFulfillment> {
    let year: i64 = row.get("year")?;
    let year = i32::try_from(year).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid year value `{year}` in habit_fulfillments.year"
        ))
    })?;

    Ok(HabitFulfillment {
        fulfillment_id: row.get("fulfillment_id")?,
        habit_id: row.get("habit_id")?,
        study_id: row.get("study_id")?,
        bucket: FulfillmentBucket {
            year,
            week: parse_u32_column(row, "habit_fulfillments", "week")?,
            weekday: parse_u32_column(row, "habit_fulfillments", "weekday")?,
        },
        created_at: row.get("created_at")?,
    })
}
