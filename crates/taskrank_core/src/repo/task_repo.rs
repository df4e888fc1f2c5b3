//! Task repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable CRUD APIs over canonical `tasks` storage.
//! - Expose the two reconciliation primitives (`find_active`,
//!   `batch_update_priorities`) the priority service builds on.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths must call `Task::validate()` before SQL mutations.
//! - Read paths must reject invalid persisted state instead of masking it.
//! - `find_active` returns rows sorted ascending by priority; the
//!   reconciler's stop-at-first-gap walk depends on that ordering.

use crate::db::DbError;
use crate::model::task::{Task, TaskId, TaskValidationError, UserId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    owner,
    priority,
    title,
    description,
    completed,
    is_deleted,
    created_at
FROM tasks";

const REQUIRED_TASK_COLUMNS: &[&str] = &[
    "uuid",
    "owner",
    "priority",
    "title",
    "description",
    "completed",
    "is_deleted",
    "created_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for task persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    Db(DbError),
    NotFound(TaskId),
    InvalidData(String),
    /// Connection has not had migrations applied.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; run migrations first"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing one owner's tasks.
///
/// Results are always ordered ascending by priority (ties broken by uuid)
/// to match how the user sees the list.
#[derive(Debug, Clone)]
pub struct TaskListQuery {
    pub owner: UserId,
    pub include_completed: bool,
    pub include_deleted: bool,
    /// Case-insensitive substring match on title.
    pub title_contains: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl TaskListQuery {
    /// Creates a query for the owner's active tasks with no paging.
    pub fn for_owner(owner: UserId) -> Self {
        Self {
            owner,
            include_completed: false,
            include_deleted: false,
            title_contains: None,
            limit: None,
            offset: 0,
        }
    }
}

/// Repository interface for task CRUD and priority reconciliation.
///
/// All read and mutation APIs are owner-scoped: a task ID belonging to a
/// different user behaves exactly like a missing row.
pub trait TaskRepository {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, id: TaskId, owner: UserId, include_deleted: bool)
        -> RepoResult<Option<Task>>;
    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>>;
    fn complete_task(&self, id: TaskId, owner: UserId) -> RepoResult<()>;
    fn soft_delete_task(&self, id: TaskId, owner: UserId) -> RepoResult<()>;

    /// Returns the owner's active tasks with `priority >= min_priority`,
    /// sorted ascending by priority.
    fn find_active(&self, owner: UserId, min_priority: u32) -> RepoResult<Vec<Task>>;

    /// Applies priority updates as one all-or-nothing batch.
    fn batch_update_priorities(&self, updates: &[(TaskId, u32)]) -> RepoResult<()>;

    /// Runs `f` against this repository inside one atomic scope.
    ///
    /// The default implementation provides no isolation; storage-backed
    /// implementations wrap a transaction so a failing step rolls back
    /// every write made inside the scope.
    fn exclusively<T>(&self, f: impl FnOnce(&Self) -> RepoResult<T>) -> RepoResult<T>
    where
        Self: Sized,
    {
        f(self)
    }
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Wraps a connection after verifying its schema is usable.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `PRAGMA user_version` does not match
    ///   the latest migration version.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the `tasks`
    ///   shape does not match what this binary expects.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = crate::db::migrations::latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        if !table_exists(conn, "tasks")? {
            return Err(RepoError::MissingRequiredTable("tasks"));
        }
        for column in REQUIRED_TASK_COLUMNS {
            if !column_exists(conn, "tasks", column)? {
                return Err(RepoError::MissingRequiredColumn {
                    table: "tasks",
                    column,
                });
            }
        }

        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create_task(&self, task: &Task) -> RepoResult<TaskId> {
        task.validate()?;

        self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                owner,
                priority,
                title,
                description,
                completed,
                is_deleted,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                task.uuid.to_string(),
                task.owner.to_string(),
                task.priority,
                task.title.as_str(),
                task.description.as_str(),
                bool_to_int(task.completed),
                bool_to_int(task.is_deleted),
                task.created_at,
            ],
        )?;

        Ok(task.uuid)
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;

        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                priority = ?1,
                title = ?2,
                description = ?3,
                completed = ?4,
                is_deleted = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?6 AND owner = ?7;",
            params![
                task.priority,
                task.title.as_str(),
                task.description.as_str(),
                bool_to_int(task.completed),
                bool_to_int(task.is_deleted),
                task.uuid.to_string(),
                task.owner.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(task.uuid));
        }

        Ok(())
    }

    fn get_task(
        &self,
        id: TaskId,
        owner: UserId,
        include_deleted: bool,
    ) -> RepoResult<Option<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE uuid = ?1
               AND owner = ?2
               AND (?3 = 1 OR is_deleted = 0);"
        ))?;

        let mut rows = stmt.query(params![
            id.to_string(),
            owner.to_string(),
            bool_to_int(include_deleted)
        ])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }

        Ok(None)
    }

    fn list_tasks(&self, query: &TaskListQuery) -> RepoResult<Vec<Task>> {
        let mut sql = format!("{TASK_SELECT_SQL} WHERE owner = ?");
        let mut bind_values: Vec<Value> = vec![Value::Text(query.owner.to_string())];

        if !query.include_completed {
            sql.push_str(" AND completed = 0");
        }
        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if let Some(fragment) = query.title_contains.as_deref() {
            sql.push_str(" AND title LIKE ? ESCAPE '\\'");
            bind_values.push(Value::Text(format!("%{}%", escape_like_fragment(fragment))));
        }

        sql.push_str(" ORDER BY priority ASC, uuid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut tasks = Vec::new();

        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }

        Ok(tasks)
    }

    fn complete_task(&self, id: TaskId, owner: UserId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                completed = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1 AND owner = ?2 AND is_deleted = 0;",
            params![id.to_string(), owner.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn soft_delete_task(&self, id: TaskId, owner: UserId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1 AND owner = ?2;",
            params![id.to_string(), owner.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn find_active(&self, owner: UserId, min_priority: u32) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TASK_SELECT_SQL}
             WHERE owner = ?1
               AND completed = 0
               AND is_deleted = 0
               AND priority >= ?2
             ORDER BY priority ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query(params![owner.to_string(), min_priority])?;
        let mut tasks = Vec::new();

        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }

        Ok(tasks)
    }

    fn batch_update_priorities(&self, updates: &[(TaskId, u32)]) -> RepoResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        // Savepoint rather than BEGIN so the batch stays nestable inside an
        // outer `exclusively` scope.
        self.conn.execute_batch("SAVEPOINT priority_batch;")?;

        let result = (|| -> RepoResult<()> {
            let mut stmt = self.conn.prepare(
                "UPDATE tasks
                 SET
                    priority = ?1,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE uuid = ?2;",
            )?;

            for (id, new_priority) in updates {
                let changed = stmt.execute(params![new_priority, id.to_string()])?;
                if changed == 0 {
                    return Err(RepoError::NotFound(*id));
                }
            }

            Ok(())
        })();

        match result {
            Ok(()) => {
                self.conn.execute_batch("RELEASE SAVEPOINT priority_batch;")?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch(
                    "ROLLBACK TO SAVEPOINT priority_batch;
                     RELEASE SAVEPOINT priority_batch;",
                );
                Err(err)
            }
        }
    }

    fn exclusively<T>(&self, f: impl FnOnce(&Self) -> RepoResult<T>) -> RepoResult<T> {
        self.conn.execute_batch("SAVEPOINT task_write;")?;

        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("RELEASE SAVEPOINT task_write;")?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch(
                    "ROLLBACK TO SAVEPOINT task_write;
                     RELEASE SAVEPOINT task_write;",
                );
                Err(err)
            }
        }
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in tasks.uuid"))
    })?;

    let owner_text: String = row.get("owner")?;
    let owner = Uuid::parse_str(&owner_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid owner value `{owner_text}` in tasks.owner"))
    })?;

    let priority: i64 = row.get("priority")?;
    let priority = u32::try_from(priority).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid priority value `{priority}` in tasks.priority"
        ))
    })?;

    let task = Task {
        uuid,
        owner,
        priority,
        title: row.get("title")?,
        description: row.get("description")?,
        completed: int_to_bool(row.get("completed")?, "tasks.completed")?,
        is_deleted: int_to_bool(row.get("is_deleted")?, "tasks.is_deleted")?,
        created_at: row.get("created_at")?,
    };
    task.validate()?;
    Ok(task)
}

fn table_exists(conn: &Connection, table_name: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table_name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn column_exists(conn: &Connection, table_name: &str, column_name: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM pragma_table_info(?1)
            WHERE name = ?2
        );",
        [table_name, column_name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn escape_like_fragment(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
