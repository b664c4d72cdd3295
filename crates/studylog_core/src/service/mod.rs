//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep the CLI and any future transport layer decoupled from storage
//!   details.

pub mod emoji_service;
pub mod habit_reconcile;
pub mod habit_service;
pub mod study_service;
