//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical prioritized-task record.
//! - Provide lifecycle helpers for completion and soft-delete semantics.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another task.
//! - `priority` is always >= 1; lower value means higher precedence.
//! - `is_deleted` is the source of truth for tombstone state.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier for a task record.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type TaskId = Uuid;

/// Identifier of the user account owning a task.
///
/// The core treats it as opaque; authentication lives outside this crate.
pub type UserId = Uuid;

/// Validation failures for task field constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskValidationError {
    /// `uuid` must not be the nil UUID.
    NilUuid,
    /// `owner` must not be the nil UUID.
    NilOwner,
    /// `priority` must be >= 1.
    ZeroPriority,
    /// `title` must contain non-whitespace text.
    EmptyTitle,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilUuid => write!(f, "task uuid must not be nil"),
            Self::NilOwner => write!(f, "task owner must not be nil"),
            Self::ZeroPriority => write!(f, "task priority must be >= 1"),
            Self::EmptyTitle => write!(f, "task title must not be empty"),
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical domain record for one user-owned prioritized task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable global ID used for linking and auditing.
    pub uuid: TaskId,
    /// Owning user; scopes every priority-ordering invariant.
    pub owner: UserId,
    /// Position in the owner's ordering; >= 1, lower comes first.
    pub priority: u32,
    /// Short display text; never empty after trimming.
    pub title: String,
    /// Free-form body text; may be empty.
    pub description: String,
    /// Completed tasks leave the active ordering but stay readable.
    pub completed: bool,
    /// Soft delete tombstone to preserve history.
    pub is_deleted: bool,
    /// Unix epoch milliseconds, set at construction.
    pub created_at: i64,
}

impl Task {
    /// Creates a new active task with a generated stable ID.
    ///
    /// # Invariants
    /// - `completed` and `is_deleted` start as `false`.
    /// - `created_at` is set to the current wall-clock time.
    pub fn new(owner: UserId, priority: u32, title: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), owner, priority, title)
    }

    /// Creates a task with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(
        uuid: TaskId,
        owner: UserId,
        priority: u32,
        title: impl Into<String>,
    ) -> Self {
        Self {
            uuid,
            owner,
            priority,
            title: title.into(),
            description: String::new(),
            completed: false,
            is_deleted: false,
            created_at: epoch_ms_now(),
        }
    }

    /// Checks field constraints; write paths call this before persistence.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.uuid.is_nil() {
            return Err(TaskValidationError::NilUuid);
        }
        if self.owner.is_nil() {
            return Err(TaskValidationError::NilOwner);
        }
        if self.priority == 0 {
            return Err(TaskValidationError::ZeroPriority);
        }
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        Ok(())
    }

    /// Marks this task completed; it leaves the active ordering.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// Marks this task as softly deleted (tombstoned).
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }

    /// Clears the soft delete flag.
    pub fn restore(&mut self) {
        self.is_deleted = false;
    }

    /// Returns whether this task participates in the priority ordering.
    pub fn is_active(&self) -> bool {
        !self.completed && !self.is_deleted
    }
}

fn epoch_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
