//! Emoji reaction service.
//!
//! # Invariants
//! - Reacting with an emoji the study already has bumps its hit counter;
//!   lookup and write happen in one transaction.
//! - Names are compared as exact strings.

use crate::model::study::{Emoji, EmojiId, StudyId};
use crate::repo::emoji_repo::EmojiRepository;
use crate::service::study_service::{StudyServiceError, StudyServiceResult};
use log::info;

/// Use-case service for per-study emoji reactions.
pub struct EmojiService<R: EmojiRepository> {
    repo: R,
}

impl<R: EmojiRepository> EmojiService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Lists the study's reactions, newest first.
    pub fn list_emojis(&self, study_id: StudyId) -> StudyServiceResult<Vec<Emoji>> {
        Ok(self.repo.list_emojis(study_id)?)
    }

    /// Adds one reaction, creating the emoji with one hit on first use.
    pub fn add_emoji(&self, study_id: StudyId, emoji_name: &str) -> StudyServiceResult<Emoji> {
        if emoji_name.trim().is_empty() {
            return Err(StudyServiceError::InvalidInput(
                "emoji name must not be blank".to_string(),
            ));
        }

        let emoji = self.repo.run_in_transaction(|repo| {
            match repo.find_emoji_by_name(study_id, emoji_name)? {
                Some(existing) => repo.increment_emoji_hit(existing.emoji_id),
                None => repo.create_emoji(study_id, emoji_name),
            }
        })?;

        info!(
            "event=emoji_add module=service status=ok study_id={study_id} emoji_id={} emoji_hit={}",
            emoji.emoji_id, emoji.emoji_hit
        );
        Ok(emoji)
    }

    pub fn increment_emoji_hit(&self, emoji_id: EmojiId) -> StudyServiceResult<Emoji> {
        Ok(self.repo.increment_emoji_hit(emoji_id)?)
    }

    pub fn delete_emoji(&self, emoji_id: EmojiId) -> StudyServiceResult<()> {
        self.repo.delete_emoji(emoji_id)?;
        Ok(())
    }
}
