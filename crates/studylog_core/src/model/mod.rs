//! Domain model for studies, habits and their satellite records.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep read models serializable for the CLI/API edge.
//!
//! # Invariants
//! - Every record is identified by a store-assigned integer id.
//! - Habits are soft-deleted through `is_removed`; reconciliation never
//!   hard-deletes them.

pub mod habit;
pub mod study;
