//! Core domain logic for the study group tracker.
//! This crate is the single source of truth for business invariants.

pub mod calendar;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use calendar::{bucket_for, Calendar, Clock, FixedClock, SystemClock};
pub use config::{ConfigError, CoreConfig, DbLocation};
pub use db::{open_db, open_db_in_memory, open_db_with, Connection, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::habit::{
    DesiredHabit, DesiredHabitInput, FulfillmentBucket, FulfillmentId, Habit, HabitFulfillment,
    HabitId, WeekKey,
};
pub use model::study::{
    Emoji, EmojiId, NewStudy, Point, PointId, Study, StudyId, StudySort, StudyUpdate,
};
pub use repo::emoji_repo::{EmojiRepository, SqliteEmojiRepository};
pub use repo::habit_repo::{HabitRepository, SqliteHabitRepository};
pub use repo::study_repo::{SqliteStudyRepository, StudyListQuery, StudyRepository};
pub use repo::{RepoError, RepoResult};
pub use service::emoji_service::EmojiService;
pub use service::habit_reconcile::{reconcile_habits, ReconcileOutcome};
pub use service::habit_service::{
    CreateHabitsOutcome, HabitService, HabitServiceError, TodayHabit, WeekHabit,
};
pub use service::study_service::{
    StudyDetail, StudyPage, StudyService, StudyServiceError, TodayConcentration,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
