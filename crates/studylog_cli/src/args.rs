//! Command-line arguments and environment variable handling.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use studylog_core::config::DEFAULT_UTC_OFFSET_MINUTES;
use studylog_core::{CoreConfig, StudyId, StudyListQuery, StudySort};

#[derive(Parser, Debug)]
#[command(name = "studylog")]
#[command(about = "Study group habit tracker", version)]
pub struct Cli {
    /// SQLite database file; in-memory when omitted
    #[arg(long, env = "STUDYLOG_DB")]
    pub db: Option<PathBuf>,

    /// Fixed UTC offset, in minutes, used to bucket fulfillments
    #[arg(
        long,
        env = "STUDYLOG_UTC_OFFSET_MINUTES",
        default_value_t = DEFAULT_UTC_OFFSET_MINUTES,
        allow_hyphen_values = true
    )]
    pub utc_offset_minutes: i32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "STUDYLOG_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "STUDYLOG_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn core_config(&self) -> CoreConfig {
        let config = match self.db.as_ref() {
            Some(path) => CoreConfig::with_db_file(path),
            None => CoreConfig::default(),
        };
        config.utc_offset_minutes(self.utc_offset_minutes)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Study groups
    #[command(subcommand)]
    Study(StudyCommand),
    /// Habits and fulfillments
    #[command(subcommand)]
    Habit(HabitCommand),
    /// Point awards
    #[command(subcommand)]
    Point(PointCommand),
    /// Emoji reactions
    #[command(subcommand)]
    Emoji(EmojiCommand),
    /// Print the core version
    Version,
}

#[derive(Subcommand, Debug)]
pub enum StudyCommand {
    Create {
        #[arg(long)]
        nickname: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        introduction: String,
        #[arg(long, default_value_t = 0)]
        background: i64,
        /// Focus duration as HH:MM:SS
        #[arg(long)]
        concentration_time: Option<String>,
    },
    Update {
        study_id: StudyId,
        #[arg(long)]
        nickname: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        introduction: Option<String>,
        #[arg(long)]
        background: Option<i64>,
    },
    Delete {
        study_id: StudyId,
    },
    Show {
        study_id: StudyId,
    },
    List(ListArgs),
    /// Every study, newest first, without paging
    All,
    /// Load up to three studies in the given order
    Pick {
        #[arg(required = true)]
        study_ids: Vec<StudyId>,
    },
    /// Study with emojis and one week of fulfillments
    Detail {
        study_id: StudyId,
        #[arg(long)]
        week: u32,
    },
    /// Show or set the focus timer
    Concentration {
        study_id: StudyId,
        #[arg(long)]
        set: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    #[arg(long, default_value_t = 6)]
    pub limit: u32,
    /// recent, oldest, points_desc or points_asc
    #[arg(long, default_value = "recent")]
    pub sort: String,
    #[arg(long)]
    pub search: Option<String>,
}

impl ListArgs {
    pub fn query(&self) -> StudyListQuery {
        StudyListQuery {
            page: self.page,
            limit: self.limit,
            sort: StudySort::parse_lenient(&self.sort),
            search: self.search.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum HabitCommand {
    /// Active habits of a study, or of every study
    List {
        study_id: Option<StudyId>,
    },
    Create {
        study_id: StudyId,
        #[arg(required = true)]
        names: Vec<String>,
    },
    Rename {
        study_id: StudyId,
        habit_id: i64,
        name: String,
    },
    Delete {
        study_id: StudyId,
        habit_id: i64,
    },
    /// Habits fulfilled today
    Today {
        study_id: StudyId,
    },
    /// This week's fulfillments per habit
    Week {
        study_id: StudyId,
    },
    /// Reconcile with a JSON roster `[{"habit_pk":1,"habit_name":"Run"}, ...]`
    Reconcile {
        study_id: StudyId,
        /// Roster file; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Record one fulfillment for today
    Fulfill {
        study_id: StudyId,
        habit_id: i64,
    },
    Unfulfill {
        fulfillment_id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum PointCommand {
    /// Awards of one study, or of every study when omitted
    List {
        study_id: Option<StudyId>,
    },
    Add {
        study_id: StudyId,
        #[arg(allow_hyphen_values = true)]
        point: i64,
        #[arg(long, default_value = "")]
        content: String,
    },
    Delete {
        study_id: StudyId,
        point_id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum EmojiCommand {
    List { study_id: StudyId },
    Add { study_id: StudyId, name: String },
    Hit { emoji_id: i64 },
    Delete { emoji_id: i64 },
}
