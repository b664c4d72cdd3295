//! Study and point-award repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist study groups and their point awards.
//! - Page, sort and search study listings.
//! - Keep `studies.point_sum` derived from `points`.
//!
//! # Invariants
//! - Listing order is deterministic; ties break on `study_id`.
//! - `refresh_point_sum` is the only writer of `point_sum`.

use crate::model::study::{
    NewStudy, Point, PointId, Study, StudyId, StudySort, StudyUpdate, DEFAULT_CONCENTRATION_TIME,
};
use crate::repo::{placeholders, with_transaction, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const STUDY_SELECT_SQL: &str = "SELECT
    study_id,
    nickname,
    study_name,
    study_introduction,
    background,
    point_sum,
    concentration_time,
    created_at,
    updated_at
FROM studies";

const POINT_SELECT_SQL: &str = "SELECT
    point_id,
    study_id,
    point_content,
    point,
    created_at
FROM points";

/// Page size used when the caller does not provide one.
pub const STUDIES_DEFAULT_LIMIT: u32 = 6;
/// Largest accepted page size.
pub const STUDIES_LIMIT_MAX: u32 = 50;

/// Paged study listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyListQuery {
    /// One-based page index.
    pub page: u32,
    pub limit: u32,
    pub sort: StudySort,
    /// Substring matched against `study_name`.
    pub search: Option<String>,
}

impl Default for StudyListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: STUDIES_DEFAULT_LIMIT,
            sort: StudySort::Recent,
            search: None,
        }
    }
}

impl StudyListQuery {
    /// Clamps page to `>= 1`, limit to `1..=50` and drops blank searches.
    pub fn normalized(&self) -> Self {
        let limit = match self.limit {
            0 => STUDIES_DEFAULT_LIMIT,
            value if value > STUDIES_LIMIT_MAX => STUDIES_LIMIT_MAX,
            value => value,
        };
        Self {
            page: self.page.max(1),
            limit,
            sort: self.sort,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Repository interface for studies and points.
pub trait StudyRepository {
    fn create_study(&self, study: &NewStudy) -> RepoResult<Study>;
    fn get_study(&self, study_id: StudyId) -> RepoResult<Option<Study>>;
    fn update_study(&self, study_id: StudyId, update: &StudyUpdate) -> RepoResult<Study>;
    fn set_concentration_time(&self, study_id: StudyId, value: &str) -> RepoResult<Study>;
    fn delete_study(&self, study_id: StudyId) -> RepoResult<()>;
    /// Returns one page of studies; expects a normalized query.
    fn list_studies(&self, query: &StudyListQuery) -> RepoResult<Vec<Study>>;
    /// Every study, newest first, without paging.
    fn list_all_studies(&self) -> RepoResult<Vec<Study>>;
    fn count_studies(&self, search: Option<&str>) -> RepoResult<u64>;
    fn find_studies_by_ids(&self, study_ids: &[StudyId]) -> RepoResult<Vec<Study>>;
    /// Lists the study's point awards, newest first.
    fn list_points(&self, study_id: StudyId) -> RepoResult<Vec<Point>>;
    fn list_all_points(&self) -> RepoResult<Vec<Point>>;
    fn get_point(&self, point_id: PointId) -> RepoResult<Option<Point>>;
    fn create_point(&self, study_id: StudyId, content: &str, point: i64) -> RepoResult<Point>;
    fn delete_point(&self, point_id: PointId) -> RepoResult<()>;
    /// Recomputes `point_sum` from the study's awards and returns it.
    fn refresh_point_sum(&self, study_id: StudyId) -> RepoResult<i64>;
    fn run_in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> RepoResult<T>;
}

/// SQLite-backed study repository.
pub struct SqliteStudyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStudyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn require_study(&self, study_id: StudyId) -> RepoResult<Study> {
        self.get_study(study_id)?
            .ok_or(RepoError::not_found("study", study_id))
    }
}

impl StudyRepository for SqliteStudyRepository<'_> {
    fn create_study(&self, study: &NewStudy) -> RepoResult<Study> {
        self.conn.execute(
            "INSERT INTO studies (
                nickname,
                study_name,
                study_introduction,
                background,
                concentration_time
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                study.nickname.as_str(),
                study.study_name.as_str(),
                study.study_introduction.as_str(),
                study.background,
                study
                    .concentration_time
                    .as_deref()
                    .unwrap_or(DEFAULT_CONCENTRATION_TIME),
            ],
        )?;
        let study_id = self.conn.last_insert_rowid();
        self.require_study(study_id)
    }

    fn get_study(&self, study_id: StudyId) -> RepoResult<Option<Study>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{STUDY_SELECT_SQL} WHERE study_id = ?1;"))?;
        let mut rows = stmt.query([study_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_study_row(row)?));
        }

        Ok(None)
    }

    fn update_study(&self, study_id: StudyId, update: &StudyUpdate) -> RepoResult<Study> {
        let mut assignments: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(nickname) = update.nickname.as_ref() {
            assignments.push("nickname = ?");
            bind_values.push(Value::Text(nickname.clone()));
        }
        if let Some(study_name) = update.study_name.as_ref() {
            assignments.push("study_name = ?");
            bind_values.push(Value::Text(study_name.clone()));
        }
        if let Some(introduction) = update.study_introduction.as_ref() {
            assignments.push("study_introduction = ?");
            bind_values.push(Value::Text(introduction.clone()));
        }
        if let Some(background) = update.background {
            assignments.push("background = ?");
            bind_values.push(Value::Integer(background));
        }
        assignments.push("updated_at = (strftime('%s', 'now') * 1000)");
        bind_values.push(Value::Integer(study_id));

        let sql = format!(
            "UPDATE studies SET {} WHERE study_id = ?;",
            assignments.join(", ")
        );
        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(RepoError::not_found("study", study_id));
        }

        self.require_study(study_id)
    }

    fn set_concentration_time(&self, study_id: StudyId, value: &str) -> RepoResult<Study> {
        let changed = self.conn.execute(
            "UPDATE studies
             SET
                concentration_time = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE study_id = ?1;",
            params![study_id, value],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("study", study_id));
        }

        self.require_study(study_id)
    }

    fn delete_study(&self, study_id: StudyId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM studies WHERE study_id = ?1;", [study_id])?;
        if changed == 0 {
            return Err(RepoError::not_found("study", study_id));
        }

        Ok(())
    }

    fn list_studies(&self, query: &StudyListQuery) -> RepoResult<Vec<Study>> {
        let mut sql = format!("{STUDY_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(search) = query.search.as_ref() {
            sql.push_str(" AND instr(study_name, ?) > 0");
            bind_values.push(Value::Text(search.clone()));
        }

        sql.push_str(match query.sort {
            StudySort::Recent => " ORDER BY created_at DESC, study_id DESC",
            StudySort::Oldest => " ORDER BY created_at ASC, study_id ASC",
            StudySort::PointsDesc => " ORDER BY point_sum DESC, study_id ASC",
            StudySort::PointsAsc => " ORDER BY point_sum ASC, study_id ASC",
        });

        sql.push_str(" LIMIT ? OFFSET ?");
        bind_values.push(Value::Integer(i64::from(query.limit)));
        bind_values.push(Value::Integer(query.offset()));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut studies = Vec::new();
        while let Some(row) = rows.next()? {
            studies.push(parse_study_row(row)?);
        }

        Ok(studies)
    }

    fn list_all_studies(&self) -> RepoResult<Vec<Study>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STUDY_SELECT_SQL} ORDER BY created_at DESC, study_id DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut studies = Vec::new();
        while let Some(row) = rows.next()? {
            studies.push(parse_study_row(row)?);
        }

        Ok(studies)
    }

    fn count_studies(&self, search: Option<&str>) -> RepoResult<u64> {
        let count: i64 = match search {
            Some(search) => self.conn.query_row(
                "SELECT COUNT(*) FROM studies WHERE instr(study_name, ?1) > 0;",
                [search],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM studies;", [], |row| row.get(0))?,
        };
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative study count `{count}`")))
    }

    fn find_studies_by_ids(&self, study_ids: &[StudyId]) -> RepoResult<Vec<Study>> {
        if study_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{STUDY_SELECT_SQL} WHERE study_id IN ({}) ORDER BY study_id ASC;",
            placeholders(study_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(study_ids.iter()))?;
        let mut studies = Vec::new();
        while let Some(row) = rows.next()? {
            studies.push(parse_study_row(row)?);
        }

        Ok(studies)
    }

    fn list_points(&self, study_id: StudyId) -> RepoResult<Vec<Point>> {
        let mut stmt = self.conn.prepare(&format!(
            "{POINT_SELECT_SQL}
             WHERE study_id = ?1
             ORDER BY created_at DESC, point_id DESC;"
        ))?;
        let mut rows = stmt.query([study_id])?;
        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            points.push(parse_point_row(row)?);
        }

        Ok(points)
    }

    fn list_all_points(&self) -> RepoResult<Vec<Point>> {
        let mut stmt = self.conn.prepare(&format!(
            "{POINT_SELECT_SQL} ORDER BY created_at DESC, point_id DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            points.push(parse_point_row(row)?);
        }

        Ok(points)
    }

    fn get_point(&self, point_id: PointId) -> RepoResult<Option<Point>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POINT_SELECT_SQL} WHERE point_id = ?1;"))?;
        let mut rows = stmt.query([point_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_point_row(row)?));
        }

        Ok(None)
    }

    fn create_point(&self, study_id: StudyId, content: &str, point: i64) -> RepoResult<Point> {
        self.conn.execute(
            "INSERT INTO points (study_id, point_content, point) VALUES (?1, ?2, ?3);",
            params![study_id, content, point],
        )?;
        let point_id = self.conn.last_insert_rowid();
        self.get_point(point_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created point {point_id} missing in read-back"))
        })
    }

    fn delete_point(&self, point_id: PointId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM points WHERE point_id = ?1;", [point_id])?;
        if changed == 0 {
            return Err(RepoError::not_found("point", point_id));
        }

        Ok(())
    }

    fn refresh_point_sum(&self, study_id: StudyId) -> RepoResult<i64> {
        let changed = self.conn.execute(
            "UPDATE studies
             SET
                point_sum = (SELECT COALESCE(SUM(point), 0) FROM points WHERE study_id = ?1),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE study_id = ?1;",
            [study_id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("study", study_id));
        }

        let point_sum = self.conn.query_row(
            "SELECT point_sum FROM studies WHERE study_id = ?1;",
            [study_id],
            |row| row.get(0),
        )?;
        Ok(point_sum)
    }

    fn run_in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&Self) -> RepoResult<T>,
    {
        with_transaction(self.conn, || f(self))
    }
}

fn parse_study_row(row: &Row<'_>) -> RepoResult<Study> {
    Ok(Study {
        study_id: row.get("study_id")?,
        nickname: row.get("nickname")?,
        study_name: row.get("study_name")?,
        study_introduction: row.get("study_introduction")?,
        background: row.get("background")?,
        point_sum: row.get("point_sum")?,
        concentration_time: row.get("concentration_time")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_point_row(row: &Row<'_>) -> RepoResult<Point> {
    Ok(Point {
        point_id: row.get("point_id")?,
        study_id: row.get("study_id")?,
        point_content: row.get("point_content")?,
        point: row.get("point")?,
        created_at: row.get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{StudyListQuery, STUDIES_DEFAULT_LIMIT, STUDIES_LIMIT_MAX};

    #[test]
    fn normalized_query_clamps_page_limit_and_blank_search() {
        let query = StudyListQuery {
            page: 0,
            limit: 500,
            search: Some("   ".to_string()),
            ..StudyListQuery::default()
        }
        .normalized();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, STUDIES_LIMIT_MAX);
        assert_eq!(query.search, None);

        let zero_limit = StudyListQuery {
            limit: 0,
            ..StudyListQuery::default()
        }
        .normalized();
        assert_eq!(zero_limit.limit, STUDIES_DEFAULT_LIMIT);
    }

    #[test]
    fn offset_skips_previous_pages() {
        let query = StudyListQuery {
            page: 3,
            limit: 2,
            ..StudyListQuery::default()
        };
        assert_eq!(query.offset(), 4);
    }
}
