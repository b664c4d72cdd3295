//! Command-line front end over `studylog_core`.
//!
//! # Responsibility
//! - Turn flags and environment into a `CoreConfig`, open the store and run
//!   exactly one operation.
//! - Print every result as pretty JSON on stdout.

mod args;

use anyhow::{Context, Result};
use args::{Cli, Command, EmojiCommand, HabitCommand, PointCommand, StudyCommand};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::io::Read;
use studylog_core::{
    default_log_level, init_logging, open_db_with, Calendar, Connection, DesiredHabitInput,
    EmojiService, HabitService, NewStudy, SqliteEmojiRepository, SqliteHabitRepository,
    SqliteStudyRepository, StudyService, StudyUpdate,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_ref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).context("failed to initialize logging")?;
    }

    let config = cli.core_config();
    let calendar = Calendar::from_config(&config)?;
    let conn = open_db_with(&config).context("failed to open database")?;
    info!("event=cli_run module=cli status=start");

    match cli.command {
        Command::Version => print_json(&studylog_core::core_version()),
        Command::Study(command) => run_study(&conn, calendar, command),
        Command::Habit(command) => run_habit(&conn, calendar, command),
        Command::Point(command) => run_point(&conn, calendar, command),
        Command::Emoji(command) => run_emoji(&conn, command),
    }
}

fn run_study(conn: &Connection, calendar: Calendar, command: StudyCommand) -> Result<()> {
    let studies = StudyService::new(SqliteStudyRepository::new(conn), calendar);

    match command {
        StudyCommand::Create {
            nickname,
            name,
            introduction,
            background,
            concentration_time,
        } => print_json(&studies.create_study(&NewStudy {
            nickname,
            study_name: name,
            study_introduction: introduction,
            background,
            concentration_time,
        })?),
        StudyCommand::Update {
            study_id,
            nickname,
            name,
            introduction,
            background,
        } => print_json(&studies.update_study(
            study_id,
            &StudyUpdate {
                nickname,
                study_name: name,
                study_introduction: introduction,
                background,
            },
        )?),
        StudyCommand::Delete { study_id } => {
            studies.delete_study(study_id)?;
            print_json(&serde_json::json!({ "deleted": study_id }))
        }
        StudyCommand::Show { study_id } => print_json(&studies.get_study(study_id)?),
        StudyCommand::List(list) => print_json(&studies.list_studies(&list.query())?),
        StudyCommand::All => print_json(&studies.list_all_studies()?),
        StudyCommand::Pick { study_ids } => print_json(&studies.get_studies_by_ids(&study_ids)?),
        StudyCommand::Detail { study_id, week } => print_json(&studies.study_detail(
            &SqliteEmojiRepository::new(conn),
            &SqliteHabitRepository::new(conn),
            study_id,
            week,
        )?),
        StudyCommand::Concentration { study_id, set } => match set {
            Some(value) => print_json(&studies.update_concentration_time(study_id, &value)?),
            None => print_json(&studies.today_concentration(study_id)?),
        },
    }
}

fn run_habit(conn: &Connection, calendar: Calendar, command: HabitCommand) -> Result<()> {
    let habits = HabitService::new(SqliteHabitRepository::new(conn), calendar);

    match command {
        HabitCommand::List { study_id } => match study_id {
            Some(study_id) => print_json(&habits.list_habits(study_id)?),
            None => print_json(&habits.list_all_habits()?),
        },
        HabitCommand::Create { study_id, names } => {
            print_json(&habits.create_habits(study_id, &names)?)
        }
        HabitCommand::Rename {
            study_id,
            habit_id,
            name,
        } => print_json(&habits.update_habit(study_id, habit_id, &name)?),
        HabitCommand::Delete { study_id, habit_id } => {
            habits.delete_habit(study_id, habit_id)?;
            print_json(&serde_json::json!({ "deleted": habit_id }))
        }
        HabitCommand::Today { study_id } => print_json(&habits.today_habits(study_id)?),
        HabitCommand::Week { study_id } => print_json(&habits.week_fulfillments(study_id)?),
        HabitCommand::Reconcile { study_id, file } => {
            let raw = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read roster `{}`", path.display()))?,
                None => {
                    let mut raw = String::new();
                    std::io::stdin()
                        .read_to_string(&mut raw)
                        .context("failed to read roster from stdin")?;
                    raw
                }
            };
            let entries: Vec<DesiredHabitInput> =
                serde_json::from_str(&raw).context("roster must be a JSON array of habits")?;
            print_json(&habits.reconcile_inputs(study_id, entries)?)
        }
        HabitCommand::Fulfill { study_id, habit_id } => {
            print_json(&habits.create_fulfillment_today(study_id, habit_id)?)
        }
        HabitCommand::Unfulfill { fulfillment_id } => {
            habits.delete_fulfillment(fulfillment_id)?;
            print_json(&serde_json::json!({ "deleted": fulfillment_id }))
        }
    }
}

fn run_point(conn: &Connection, calendar: Calendar, command: PointCommand) -> Result<()> {
    let studies = StudyService::new(SqliteStudyRepository::new(conn), calendar);

    match command {
        PointCommand::List { study_id } => match study_id {
            Some(study_id) => print_json(&studies.list_points(study_id)?),
            None => print_json(&studies.list_all_points()?),
        },
        PointCommand::Add {
            study_id,
            point,
            content,
        } => print_json(&studies.create_point(study_id, &content, point)?),
        PointCommand::Delete { study_id, point_id } => {
            let point_sum = studies.delete_point(study_id, point_id)?;
            print_json(&serde_json::json!({ "deleted": point_id, "point_sum": point_sum }))
        }
    }
}

fn run_emoji(conn: &Connection, command: EmojiCommand) -> Result<()> {
    let emojis = EmojiService::new(SqliteEmojiRepository::new(conn));

    match command {
        EmojiCommand::List { study_id } => print_json(&emojis.list_emojis(study_id)?),
        EmojiCommand::Add { study_id, name } => print_json(&emojis.add_emoji(study_id, &name)?),
        EmojiCommand::Hit { emoji_id } => print_json(&emojis.increment_emoji_hit(emoji_id)?),
        EmojiCommand::Delete { emoji_id } => {
            emojis.delete_emoji(emoji_id)?;
            print_json(&serde_json::json!({ "deleted": emoji_id }))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
