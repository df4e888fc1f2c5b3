//! Domain model for user-owned prioritized tasks.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep field constraints in one place, checked on every write path.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod task;
