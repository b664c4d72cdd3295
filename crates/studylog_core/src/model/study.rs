//! Study group, point award and emoji reaction model.
//!
//! # Invariants
//! - `point_sum` mirrors the sum of the study's point awards.
//! - `concentration_time` is always `HH:MM:SS`.
//! - Emoji names are unique per study; repeated reactions bump `emoji_hit`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StudyId = i64;
pub type PointId = i64;
pub type EmojiId = i64;

/// Concentration timer preset used when a study is created without one.
pub const DEFAULT_CONCENTRATION_TIME: &str = "00:25:00";

static CONCENTRATION_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{2}):([0-5][0-9]):([0-5][0-9])$").expect("valid concentration time regex")
});

/// Study group record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Study {
    pub study_id: StudyId,
    pub nickname: String,
    pub study_name: String,
    pub study_introduction: String,
    /// Index of the background preset chosen by the client.
    pub background: i64,
    pub point_sum: i64,
    pub concentration_time: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

/// Input for study creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudy {
    pub nickname: String,
    pub study_name: String,
    #[serde(default)]
    pub study_introduction: String,
    #[serde(default)]
    pub background: i64,
    #[serde(default)]
    pub concentration_time: Option<String>,
}

/// Partial study update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyUpdate {
    pub nickname: Option<String>,
    pub study_name: Option<String>,
    pub study_introduction: Option<String>,
    pub background: Option<i64>,
}

impl StudyUpdate {
    pub fn is_empty(&self) -> bool {
        self.nickname.is_none()
            && self.study_name.is_none()
            && self.study_introduction.is_none()
            && self.background.is_none()
    }
}

/// Study list ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudySort {
    #[default]
    Recent,
    Oldest,
    PointsDesc,
    PointsAsc,
}

impl StudySort {
    /// Parses a client sort key; unknown keys fall back to `Recent`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim() {
            "oldest" => Self::Oldest,
            "points_desc" => Self::PointsDesc,
            "points_asc" => Self::PointsAsc,
            _ => Self::Recent,
        }
    }
}

/// Point award granted to a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub point_id: PointId,
    pub study_id: StudyId,
    pub point_content: String,
    pub point: i64,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Emoji reaction counter of a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub emoji_id: EmojiId,
    pub study_id: StudyId,
    pub emoji_name: String,
    pub emoji_hit: i64,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Malformed `HH:MM:SS` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcentrationTimeError(pub String);

impl Display for ConcentrationTimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid concentration time `{}`; expected HH:MM:SS", self.0)
    }
}

impl Error for ConcentrationTimeError {}

/// Validates a concentration timer value.
pub fn validate_concentration_time(value: &str) -> Result<(), ConcentrationTimeError> {
    if CONCENTRATION_TIME_RE.is_match(value) {
        Ok(())
    } else {
        Err(ConcentrationTimeError(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_concentration_time, StudySort, DEFAULT_CONCENTRATION_TIME};

    #[test]
    fn concentration_time_accepts_hh_mm_ss_only() {
        assert!(validate_concentration_time(DEFAULT_CONCENTRATION_TIME).is_ok());
        assert!(validate_concentration_time("01:59:59").is_ok());
        assert!(validate_concentration_time("1:00:00").is_err());
        assert!(validate_concentration_time("00:60:00").is_err());
        assert!(validate_concentration_time("00:25").is_err());
    }

    #[test]
    fn unknown_sort_keys_fall_back_to_recent() {
        assert_eq!(StudySort::parse_lenient("points_desc"), StudySort::PointsDesc);
        assert_eq!(StudySort::parse_lenient("popular"), StudySort::Recent);
    }
}
