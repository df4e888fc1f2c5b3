//! Task use-case service.
//!
//! # Responsibility
//! - Provide stable create/update/complete/delete/list entry points.
//! - Run priority reconciliation before any save that claims a slot.
//!
//! # Invariants
//! - Reconcile-then-save always executes inside one exclusive repository
//!   scope, so a failed save also rolls back the shifts it triggered.
//! - Updates reconcile only when the stored priority actually changed.
//! - Completion and soft delete bypass reconciliation entirely.

use crate::model::task::{Task, TaskId, UserId};
use crate::repo::task_repo::{RepoError, RepoResult, TaskListQuery, TaskRepository};
use crate::service::priority::reconcile_priorities;

/// Use-case service wrapper for task operations.
pub struct TaskService<R: TaskRepository> {
    repo: R,
}

impl<R: TaskRepository> TaskService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a task, first freeing its priority slot.
    ///
    /// # Contract
    /// - Validates the task before touching storage.
    /// - Reconciliation and insert commit or roll back together.
    /// - Returns the created stable task ID.
    pub fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
        task.validate()?;

        self.repo.exclusively(|repo| {
            reconcile_priorities(repo, task.priority, task.owner)?;
            repo.create_task(task)
        })
    }

    /// Updates an existing task, reconciling when its priority changed.
    ///
    /// # Contract
    /// - `NotFound` when the task does not exist for this owner.
    /// - An unchanged priority skips reconciliation, so saving edits to
    ///   title or description never renumbers neighbors.
    pub fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        self.repo.exclusively(|repo| {
            let stored = repo
                .get_task(task.uuid, task.owner, true)?
                .ok_or(RepoError::NotFound(task.uuid))?;

            if stored.priority != task.priority {
                reconcile_priorities(repo, task.priority, task.owner)?;
            }

            repo.update_task(task)
        })
    }

    /// Marks a task completed; it leaves the active ordering untouched.
    pub fn complete_task(&self, id: TaskId, owner: UserId) -> RepoResult<()> {
        self.repo.complete_task(id, owner)
    }

    /// Soft-deletes a task by ID for this owner.
    pub fn soft_delete_task(&self, id: TaskId, owner: UserId) -> RepoResult<()> {
        self.repo.soft_delete_task(id, owner)
    }

    /// Gets one task by ID with optional deleted-row visibility.
    pub fn get_task(
        &self,
        id: TaskId,
        owner: UserId,
        include_deleted: bool,
    ) -> RepoResult<Option<Task>> {
        self.repo.get_task(id, owner, include_deleted)
    }

    /// Lists tasks using filter and pagination options.
    pub fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>> {
        self.repo.list_tasks(query)
    }
}
