//! Study use-case service.
//!
//! # Responsibility
//! - Study CRUD, paged listing and the study detail view.
//! - Point awards, keeping `point_sum` in step inside one transaction.
//! - Focus-timer ("concentration") settings.
//!
//! # Invariants
//! - Point mutations and the `point_sum` refresh commit together.
//! - A point is only deletable through the study that owns it.

use crate::calendar::{Calendar, Clock, SystemClock};
use crate::model::habit::{HabitFulfillment, HabitId, WeekKey};
use crate::model::study::{
    validate_concentration_time, Emoji, NewStudy, Point, PointId, Study, StudyId, StudyUpdate,
};
use crate::repo::emoji_repo::EmojiRepository;
use crate::repo::habit_repo::{
    ActiveFilter, BucketFilter, FulfillmentFilter, HabitFilter, HabitRepository,
};
use crate::repo::study_repo::{StudyListQuery, StudyRepository};
use crate::repo::{RepoError, RepoResult};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Largest number of ids honored by `get_studies_by_ids`.
pub const STUDIES_BY_IDS_MAX: usize = 3;
const WEEK_MAX: u32 = 53;

/// Service error for study use-cases.
#[derive(Debug)]
pub enum StudyServiceError {
    InvalidInput(String),
    NotFound { entity: &'static str, id: i64 },
    Store(RepoError),
}

impl Display for StudyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StudyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StudyServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Conflict(message) => Self::InvalidInput(message),
            other => Self::Store(other),
        }
    }
}

pub type StudyServiceResult<T> = Result<T, StudyServiceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

/// One page of the study listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPage {
    pub studies: Vec<Study>,
    pub pagination: Pagination,
}

/// Fulfillment shown on the study detail page, joined with its habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailFulfillment {
    #[serde(flatten)]
    pub fulfillment: HabitFulfillment,
    pub habit_name: String,
    pub habit_is_removed: bool,
}

/// Study with its reactions and one week of habit activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDetail {
    pub study: Study,
    pub emojis: Vec<Emoji>,
    pub week: WeekKey,
    pub fulfillments: Vec<DetailFulfillment>,
}

/// Focus-timer card of a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayConcentration {
    pub study_name: String,
    pub total_point: i64,
    pub concentration_time: String,
}

/// Study service facade over repository implementations.
pub struct StudyService<S: StudyRepository, C: Clock = SystemClock> {
    repo: S,
    calendar: Calendar<C>,
}

impl<S: StudyRepository, C: Clock> StudyService<S, C> {
    pub fn new(repo: S, calendar: Calendar<C>) -> Self {
        Self { repo, calendar }
    }

    pub fn create_study(&self, study: &NewStudy) -> StudyServiceResult<Study> {
        require_text("nickname", &study.nickname)?;
        require_text("study_name", &study.study_name)?;
        if let Some(value) = study.concentration_time.as_deref() {
            validate_concentration_time(value)
                .map_err(|err| StudyServiceError::InvalidInput(err.to_string()))?;
        }

        let created = self.repo.create_study(study)?;
        info!(
            "event=study_create module=service status=ok study_id={}",
            created.study_id
        );
        Ok(created)
    }

    /// Applies the present fields of `update`; an empty update returns the
    /// study unchanged.
    pub fn update_study(
        &self,
        study_id: StudyId,
        update: &StudyUpdate,
    ) -> StudyServiceResult<Study> {
        if update.is_empty() {
            return self.get_study(study_id);
        }
        if let Some(nickname) = update.nickname.as_deref() {
            require_text("nickname", nickname)?;
        }
        if let Some(study_name) = update.study_name.as_deref() {
            require_text("study_name", study_name)?;
        }

        Ok(self.repo.update_study(study_id, update)?)
    }

    /// Deletes the study together with its habits, fulfillments, points and
    /// emojis.
    pub fn delete_study(&self, study_id: StudyId) -> StudyServiceResult<()> {
        self.repo.delete_study(study_id)?;
        info!("event=study_delete module=service status=ok study_id={study_id}");
        Ok(())
    }

    pub fn get_study(&self, study_id: StudyId) -> StudyServiceResult<Study> {
        self.repo
            .get_study(study_id)?
            .ok_or(StudyServiceError::NotFound {
                entity: "study",
                id: study_id,
            })
    }

    pub fn list_studies(&self, query: &StudyListQuery) -> StudyServiceResult<StudyPage> {
        let query = query.normalized();
        let studies = self.repo.list_studies(&query)?;
        let total = self.repo.count_studies(query.search.as_deref())?;

        Ok(StudyPage {
            studies,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    pub fn list_all_studies(&self) -> StudyServiceResult<Vec<Study>> {
        Ok(self.repo.list_all_studies()?)
    }

    /// Loads up to three studies in the order their ids were given; unknown
    /// ids are dropped.
    pub fn get_studies_by_ids(&self, study_ids: &[StudyId]) -> StudyServiceResult<Vec<Study>> {
        let wanted = &study_ids[..study_ids.len().min(STUDIES_BY_IDS_MAX)];
        let mut found: HashMap<StudyId, Study> = self
            .repo
            .find_studies_by_ids(wanted)?
            .into_iter()
            .map(|study| (study.study_id, study))
            .collect();

        Ok(wanted.iter().filter_map(|id| found.remove(id)).collect())
    }

    /// Builds the detail view for `week` of the current local year.
    pub fn study_detail<E, H>(
        &self,
        emojis: &E,
        habits: &H,
        study_id: StudyId,
        week: u32,
    ) -> StudyServiceResult<StudyDetail>
    where
        E: EmojiRepository,
        H: HabitRepository,
    {
        if week > WEEK_MAX {
            return Err(StudyServiceError::InvalidInput(format!(
                "week must be within 0..={WEEK_MAX}, got {week}"
            )));
        }

        let study = self.get_study(study_id)?;
        let week = WeekKey {
            year: self.calendar.local_year(),
            week,
        };
        let fulfillments = load_detail_fulfillments(habits, study_id, week)?;

        Ok(StudyDetail {
            study,
            emojis: emojis.list_emojis(study_id)?,
            week,
            fulfillments,
        })
    }

    pub fn today_concentration(&self, study_id: StudyId) -> StudyServiceResult<TodayConcentration> {
        let study = self.get_study(study_id)?;
        Ok(TodayConcentration {
            study_name: study.study_name,
            total_point: study.point_sum,
            concentration_time: study.concentration_time,
        })
    }

    /// Stores a new focus duration in `HH:MM:SS` form.
    pub fn update_concentration_time(
        &self,
        study_id: StudyId,
        concentration_time: &str,
    ) -> StudyServiceResult<Study> {
        validate_concentration_time(concentration_time)
            .map_err(|err| StudyServiceError::InvalidInput(err.to_string()))?;
        Ok(self
            .repo
            .set_concentration_time(study_id, concentration_time)?)
    }

    pub fn list_points(&self, study_id: StudyId) -> StudyServiceResult<Vec<Point>> {
        self.get_study(study_id)?;
        Ok(self.repo.list_points(study_id)?)
    }

    /// Point awards of every study, newest first.
    pub fn list_all_points(&self) -> StudyServiceResult<Vec<Point>> {
        Ok(self.repo.list_all_points()?)
    }

    /// Records an award and refreshes the study's point sum.
    pub fn create_point(
        &self,
        study_id: StudyId,
        point_content: &str,
        point: i64,
    ) -> StudyServiceResult<Point> {
        let (created, point_sum) = self.repo.run_in_transaction(|repo| {
            if repo.get_study(study_id)?.is_none() {
                return Err(RepoError::not_found("study", study_id));
            }
            let created = repo.create_point(study_id, point_content, point)?;
            let point_sum = repo.refresh_point_sum(study_id)?;
            Ok((created, point_sum))
        })?;

        info!(
            "event=point_create module=service status=ok study_id={study_id} point_id={} point_sum={point_sum}",
            created.point_id
        );
        Ok(created)
    }

    /// Removes an award of the study and refreshes its point sum.
    pub fn delete_point(&self, study_id: StudyId, point_id: PointId) -> StudyServiceResult<i64> {
        let point_sum = self.repo.run_in_transaction(|repo| {
            let owned = repo
                .get_point(point_id)?
                .is_some_and(|point| point.study_id == study_id);
            if !owned {
                return Err(RepoError::not_found("point", point_id));
            }
            repo.delete_point(point_id)?;
            repo.refresh_point_sum(study_id)
        })?;

        info!(
            "event=point_delete module=service status=ok study_id={study_id} point_id={point_id} point_sum={point_sum}"
        );
        Ok(point_sum)
    }
}

fn require_text(field: &str, value: &str) -> StudyServiceResult<()> {
    if value.trim().is_empty() {
        return Err(StudyServiceError::InvalidInput(format!(
            "{field} must not be blank"
        )));
    }
    Ok(())
}

fn load_detail_fulfillments<H: HabitRepository>(
    habits: &H,
    study_id: StudyId,
    week: WeekKey,
) -> RepoResult<Vec<DetailFulfillment>> {
    let fulfillments =
        habits.find_fulfillments(&FulfillmentFilter::study(study_id, BucketFilter::week(week)))?;
    if fulfillments.is_empty() {
        return Ok(Vec::new());
    }

    let mut habit_ids: Vec<HabitId> = fulfillments.iter().map(|f| f.habit_id).collect();
    habit_ids.sort_unstable();
    habit_ids.dedup();
    let owners: HashMap<HabitId, (String, bool)> = habits
        .find_habits(&HabitFilter::study(study_id, ActiveFilter::Any).with_ids(habit_ids))?
        .into_iter()
        .map(|habit| (habit.habit_id, (habit.habit_name, habit.is_removed)))
        .collect();

    fulfillments
        .into_iter()
        .map(|fulfillment| -> RepoResult<DetailFulfillment> {
            let (habit_name, habit_is_removed) =
                owners.get(&fulfillment.habit_id).cloned().ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "fulfillment {} references missing habit {}",
                        fulfillment.fulfillment_id, fulfillment.habit_id
                    ))
                })?;
            Ok(DetailFulfillment {
                fulfillment,
                habit_name,
                habit_is_removed,
            })
        })
        .collect()
}
