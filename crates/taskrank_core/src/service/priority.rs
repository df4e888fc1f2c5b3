//! Priority reconciliation for one owner's active tasks.
//!
//! # Responsibility
//! - Free a requested priority slot by shifting colliding active tasks
//!   forward, so no two active tasks of one owner share a value.
//!
//! # Invariants
//! - Only active tasks (`completed = 0`, `is_deleted = 0`) are ever shifted.
//! - The cascade walks a priority-ascending sequence and stops at the first
//!   gap; it never renumbers more tasks than necessary.
//! - All shifts land in a single batch write, or none do.

use crate::model::task::UserId;
use crate::repo::task_repo::{RepoResult, TaskRepository};
use log::info;

/// Shifts colliding active-task priorities so `desired_priority` is free.
///
/// Walks the owner's active tasks with `priority >= desired_priority` in
/// ascending order, carrying a cursor that starts at the desired value:
/// a task equal to the cursor is shifted up by one and the cursor advances;
/// a task above the cursor proves a gap, so the walk stops. Tasks below the
/// cursor (pre-existing duplicates) are skipped, which shifts each run of
/// equal values by one instead of failing.
///
/// Returns the number of tasks shifted. Callers must invoke this before
/// saving the triggering task, and must not save it if this returns an
/// error, otherwise the freed slot is not guaranteed.
pub fn reconcile_priorities<R: TaskRepository>(
    repo: &R,
    desired_priority: u32,
    owner: UserId,
) -> RepoResult<usize> {
    let conflicts = repo.find_active(owner, desired_priority)?;

    let mut cursor = desired_priority;
    let mut shifts = Vec::new();
    for task in &conflicts {
        if task.priority == cursor {
            shifts.push((task.uuid, task.priority + 1));
            cursor += 1;
        } else if task.priority > cursor {
            break;
        }
    }

    if !shifts.is_empty() {
        repo.batch_update_priorities(&shifts)?;
    }

    info!(
        "event=priority_reconcile module=service status=ok owner={} desired={} shifted={}",
        owner,
        desired_priority,
        shifts.len()
    );

    Ok(shifts.len())
}

#[cfg(test)]
mod tests {
    use super::reconcile_priorities;
    use crate::model::task::{Task, TaskId, UserId};
    use crate::repo::task_repo::{RepoError, RepoResult, TaskListQuery, TaskRepository};
    use std::cell::RefCell;
    use uuid::Uuid;

    /// In-memory store recording batch writes, for cascade-shape assertions
    /// that are awkward to express through SQLite.
    struct FakeRepo {
        tasks: RefCell<Vec<Task>>,
        batches: RefCell<Vec<Vec<(TaskId, u32)>>>,
        fail_batch: bool,
    }

    impl FakeRepo {
        fn with_priorities(owner: UserId, priorities: &[u32]) -> Self {
            let tasks = priorities
                .iter()
                .map(|priority| Task::new(owner, *priority, format!("p{priority}")))
                .collect();
            Self {
                tasks: RefCell::new(tasks),
                batches: RefCell::new(Vec::new()),
                fail_batch: false,
            }
        }

        fn priorities(&self, owner: UserId) -> Vec<u32> {
            let mut values: Vec<u32> = self
                .tasks
                .borrow()
                .iter()
                .filter(|task| task.owner == owner && task.is_active())
                .map(|task| task.priority)
                .collect();
            values.sort_unstable();
            values
        }
    }

    impl TaskRepository for FakeRepo {
        fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
            self.tasks.borrow_mut().push(task.clone());
            Ok(task.uuid)
        }

        fn update_task(&self, _task: &Task) -> RepoResult<()> {
            unimplemented!("not exercised by reconciler tests")
        }

        fn get_task(
            &self,
            _id: TaskId,
            _owner: UserId,
            _include_deleted: bool,
        ) -> RepoResult<Option<Task>> {
            unimplemented!("not exercised by reconciler tests")
        }

        fn list_tasks(&self, _query: &TaskListQuery) -> RepoResult<Vec<Task>> {
            unimplemented!("not exercised by reconciler tests")
        }

        fn complete_task(&self, _id: TaskId, _owner: UserId) -> RepoResult<()> {
            unimplemented!("not exercised by reconciler tests")
        }

        fn soft_delete_task(&self, _id: TaskId, _owner: UserId) -> RepoResult<()> {
            unimplemented!("not exercised by reconciler tests")
        }

        fn find_active(&self, owner: UserId, min_priority: u32) -> RepoResult<Vec<Task>> {
            let mut matched: Vec<Task> = self
                .tasks
                .borrow()
                .iter()
                .filter(|task| {
                    task.owner == owner && task.is_active() && task.priority >= min_priority
                })
                .cloned()
                .collect();
            matched.sort_by_key(|task| task.priority);
            Ok(matched)
        }

        fn batch_update_priorities(&self, updates: &[(TaskId, u32)]) -> RepoResult<()> {
            if self.fail_batch {
                return Err(RepoError::InvalidData("injected batch failure".to_string()));
            }
            self.batches.borrow_mut().push(updates.to_vec());
            let mut tasks = self.tasks.borrow_mut();
            for (id, new_priority) in updates {
                let task = tasks
                    .iter_mut()
                    .find(|task| task.uuid == *id)
                    .ok_or(RepoError::NotFound(*id))?;
                task.priority = *new_priority;
            }
            Ok(())
        }
    }

    #[test]
    fn contiguous_run_cascades_until_gap() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[1, 2, 3]);

        let shifted = reconcile_priorities(&repo, 2, owner).unwrap();

        assert_eq!(shifted, 2);
        assert_eq!(repo.priorities(owner), vec![1, 3, 4]);
    }

    #[test]
    fn gap_at_desired_value_writes_nothing() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[1, 3, 5]);

        let shifted = reconcile_priorities(&repo, 2, owner).unwrap();

        assert_eq!(shifted, 0);
        assert!(repo.batches.borrow().is_empty());
        assert_eq!(repo.priorities(owner), vec![1, 3, 5]);
    }

    #[test]
    fn cascade_stops_at_first_gap_not_at_sequence_end() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[2, 3, 7, 8]);

        let shifted = reconcile_priorities(&repo, 2, owner).unwrap();

        // 7 and 8 sit past the gap at 4 and must stay untouched.
        assert_eq!(shifted, 2);
        assert_eq!(repo.priorities(owner), vec![3, 4, 7, 8]);
    }

    #[test]
    fn empty_store_is_a_noop() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[]);

        let shifted = reconcile_priorities(&repo, 1, owner).unwrap();

        assert_eq!(shifted, 0);
        assert!(repo.batches.borrow().is_empty());
    }

    #[test]
    fn shifts_land_in_a_single_batch() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[4, 5, 6]);

        reconcile_priorities(&repo, 4, owner).unwrap();

        let batches = repo.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn corrupted_duplicates_shift_one_per_run() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[5, 5, 6]);

        let shifted = reconcile_priorities(&repo, 5, owner).unwrap();

        // First 5 moves to 6, the stale duplicate is skipped, the original
        // 6 moves to 7. The visited range ends without duplicates.
        assert_eq!(shifted, 2);
        assert_eq!(repo.priorities(owner), vec![5, 6, 7]);
    }

    #[test]
    fn second_reconcile_on_settled_state_is_a_noop() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[1, 2, 3]);

        reconcile_priorities(&repo, 2, owner).unwrap();
        let shifted_again = reconcile_priorities(&repo, 2, owner).unwrap();

        assert_eq!(shifted_again, 0);
        assert_eq!(repo.priorities(owner), vec![1, 3, 4]);
    }

    #[test]
    fn completed_and_deleted_tasks_are_never_shifted() {
        let owner = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[2]);
        let mut done = Task::new(owner, 2, "already done");
        done.complete();
        repo.create_task(&done).unwrap();
        let mut gone = Task::new(owner, 2, "tombstoned");
        gone.soft_delete();
        repo.create_task(&gone).unwrap();

        reconcile_priorities(&repo, 2, owner).unwrap();

        let tasks = repo.tasks.borrow();
        let done_row = tasks.iter().find(|task| task.uuid == done.uuid).unwrap();
        let gone_row = tasks.iter().find(|task| task.uuid == gone.uuid).unwrap();
        assert_eq!(done_row.priority, 2);
        assert_eq!(gone_row.priority, 2);
    }

    #[test]
    fn other_owners_tasks_are_out_of_scope() {
        let owner = Uuid::new_v4();
        let bystander = Uuid::new_v4();
        let repo = FakeRepo::with_priorities(owner, &[2, 3]);
        repo.create_task(&Task::new(bystander, 2, "not yours")).unwrap();

        reconcile_priorities(&repo, 2, owner).unwrap();

        assert_eq!(repo.priorities(owner), vec![3, 4]);
        assert_eq!(repo.priorities(bystander), vec![2]);
    }

    #[test]
    fn batch_failure_propagates_unmodified() {
        let owner = Uuid::new_v4();
        let mut repo = FakeRepo::with_priorities(owner, &[1, 2]);
        repo.fail_batch = true;

        let err = reconcile_priorities(&repo, 1, owner).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }
}
