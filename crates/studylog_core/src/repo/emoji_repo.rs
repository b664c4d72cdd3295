//! Emoji reaction repository.
//!
//! # Invariants
//! - One row per `(study_id, emoji_name)`; repeated reactions bump the hit
//!   counter instead of inserting.

use crate::model::study::{Emoji, EmojiId, StudyId};
use crate::repo::{with_transaction, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const EMOJI_SELECT_SQL: &str = "SELECT
    emoji_id,
    study_id,
    emoji_name,
    emoji_hit,
    created_at
FROM emojis";

/// Repository interface for emoji reactions.
pub trait EmojiRepository {
    /// Lists the study's emojis, newest first.
    fn list_emojis(&self, study_id: StudyId) -> RepoResult<Vec<Emoji>>;
    fn get_emoji(&self, emoji_id: EmojiId) -> RepoResult<Option<Emoji>>;
    fn find_emoji_by_name(&self, study_id: StudyId, emoji_name: &str)
        -> RepoResult<Option<Emoji>>;
    fn create_emoji(&self, study_id: StudyId, emoji_name: &str) -> RepoResult<Emoji>;
    fn increment_emoji_hit(&self, emoji_id: EmojiId) -> RepoResult<Emoji>;
    fn delete_emoji(&self, emoji_id: EmojiId) -> RepoResult<()>;
    fn run_in_transaction<T, F>(&self, f: F) -> RepoResult<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> RepoResult<T>;
}

/// SQLite-backed emoji repository.
pub struct SqliteEmojiRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEmojiRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EmojiRepository for SqliteEmojiRepository<'_> {
    fn list_emojis(&self, study_id: StudyId) -> RepoResult<Vec<Emoji>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EMOJI_SELECT_SQL}
             WHERE study_id = ?1
             ORDER BY created_at DESC, emoji_id DESC;"
        ))?;
        let mut rows = stmt.query([study_id])?;
        let mut emojis = Vec::new();
        while let Some(row) = rows.next()? {
            emojis.push(parse_emoji_row(row)?);
        }

        Ok(emojis)
    }

    fn get_emoji(&self, emoji_id: EmojiId) -> RepoResult<Option<Emoji>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EMOJI_SELECT_SQL} WHERE emoji_id = ?1;"))?;
        let mut rows = stmt.query([emoji_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_emoji_row(row)?));
        }

        Ok(None)
    }

    fn find_emoji_by_name(
        &self,
        study_id: StudyId,
        emoji_name: &str,
    ) -> RepoResult<Option<Emoji>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EMOJI_SELECT_SQL} WHERE study_id = ?1 AND emoji_name = ?2;"
        ))?;
        let mut rows = stmt.query(params![study_id, emoji_name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_emoji_row(row)?));
        }

        Ok(None)
    }

    fn create_emoji(&self, study_id: StudyId, emoji_name: &str) -> RepoResult<Emoji> {
        self.conn.execute(
            "INSERT INTO emojis (study_id, emoji_name, emoji_hit) VALUES (?1, ?2, 1);",
            params![study_id, emoji_name],
        )?;
        let emoji_id = self.conn.last_insert_rowid();
        self.get_emoji(emoji_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("created emoji {emoji_id} missing in read-back"))
        })
    }

    fn increment_emoji_hit(&self, emoji_id: EmojiId) -> RepoResult<Emoji> {
        let changed = self.conn.execute(
            "UPDATE emojis SET emoji_hit = emoji_hit + 1 WHERE emoji_id = ?1;",
            [emoji_id],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("emoji", emoji_id));
        }

        self.get_emoji(emoji_id)?
            .ok_or(RepoError::not_found("emoji", emoji_id))
    }

    fn delete_emoji(&self, emoji_id: EmojiId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM emojis WHERE emoji_id = ?1;", [emoji_id])?;
        if changed == 0 {
            return Err(RepoError::not_found("emoji", emoji_id));
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

fn parse_emoji_row(row: &Row<'_>) -> RepoResult<Emoji> {
    Ok(Emoji {
        emoji_id: row.get("emoji_id")?,
        study_id: row.get("study_id")?,
        emoji_name: row.get("emoji_name")?,
        emoji_hit: row.get("emoji_hit")?,
        created_at: row.get("created_at")?,
    })
}
