//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `taskrank_core` linkage.
//! - Show one reconciliation pass end to end against an in-memory store.

use taskrank_core::db::open_db_in_memory;
use taskrank_core::{SqliteTaskRepository, Task, TaskListQuery, TaskService};
use uuid::Uuid;

fn main() {
    println!("taskrank_core version={}", taskrank_core::core_version());

    if let Err(err) = demo_reconcile() {
        eprintln!("demo failed: {err}");
        std::process::exit(1);
    }
}

fn demo_reconcile() -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_db_in_memory()?;
    let repo = SqliteTaskRepository::try_new(&conn)?;
    let service = TaskService::new(repo);

    let owner = Uuid::new_v4();
    service.create_task(&Task::new(owner, 1, "pay rent"))?;
    service.create_task(&Task::new(owner, 2, "file taxes"))?;
    service.create_task(&Task::new(owner, 3, "call dentist"))?;
    // Claims priority 2; the two colliding tasks shift to 3 and 4.
    service.create_task(&Task::new(owner, 2, "book flights"))?;

    for task in service.list_tasks(&TaskListQuery::for_owner(owner))? {
        println!("priority={} title={}", task.priority, task.title);
    }

    Ok(())
}
