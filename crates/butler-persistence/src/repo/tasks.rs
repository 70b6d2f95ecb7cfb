use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::{GuestId, ReservationId, TaskId};
use butler_core::time::now_iso8601;

use crate::error::{PersistenceError, Result};
use crate::models::{Task, TaskPriority, TaskSource, TaskStatus};

pub struct TaskRepository {
    conn: Mutex<Connection>,
}

impl TaskRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        title: &str,
        description: Option<&str>,
        source: TaskSource,
        priority: TaskPriority,
        guest_id: Option<&GuestId>,
        reservation_id: Option<&ReservationId>,
    ) -> Result<Task> {
        let db = self.conn.lock().unwrap();
        let id = TaskId::new();
        let now = now_iso8601();
        db.execute(
            "INSERT INTO tasks
                (id, title, description, source, status, priority, guest_id, reservation_id,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?8)",
            params![
                id.as_str(),
                title,
                description,
                source.to_string(),
                priority.to_string(),
                guest_id.map(|g| g.as_str()),
                reservation_id.map(|r| r.as_str()),
                now
            ],
        )?;
        Ok(Task {
            id,
            title: title.to_string(),
            description: description.map(String::from),
            source,
            status: TaskStatus::Pending,
            priority,
            guest_id: guest_id.cloned(),
            reservation_id: reservation_id.cloned(),
            assigned_to: None,
            started_at: None,
            completed_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Transition status, stamping `started_at`/`completed_at` per the
    /// invariant: `completedAt` set iff `status = completed`.
    pub fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let changed = match status {
            TaskStatus::InProgress => db.execute(
                "UPDATE tasks SET status = ?1, started_at = COALESCE(started_at, ?2), updated_at = ?2
                 WHERE id = ?3",
                params![status.to_string(), now, id.as_str()],
            )?,
            TaskStatus::Completed => db.execute(
                "UPDATE tasks SET status = ?1, completed_at = ?2, updated_at = ?2 WHERE id = ?3",
                params![status.to_string(), now, id.as_str()],
            )?,
            _ => db.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.to_string(), now, id.as_str()],
            )?,
        };
        if changed == 0 {
            return Err(PersistenceError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, title, description, source, status, priority, guest_id, reservation_id,
                    assigned_to, started_at, completed_at, created_at, updated_at
             FROM tasks WHERE id = ?1",
            params![id.as_str()],
            row_to_task,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn count_by_status(&self, status: TaskStatus) -> Result<u64> {
        let db = self.conn.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?1",
            params![status.to_string()],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    /// Snapshot used by the stats bridge for the `stats:tasks` topic.
    pub fn status_counts(&self) -> Result<Vec<(TaskStatus, u64)>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                let status_raw: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status_raw, count as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(s, c)| TaskStatus::from_str(&s).ok().map(|s| (s, c)))
            .collect())
    }
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let source_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let priority_raw: String = row.get(5)?;
    Ok(Task {
        id: TaskId::from(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        source: TaskSource::from_str(&source_raw).unwrap_or(TaskSource::Manual),
        status: TaskStatus::from_str(&status_raw).unwrap_or(TaskStatus::Pending),
        priority: TaskPriority::from_str(&priority_raw).unwrap_or(TaskPriority::Standard),
        guest_id: row.get::<_, Option<String>>(6)?.map(GuestId::from),
        reservation_id: row.get::<_, Option<String>>(7)?.map(ReservationId::from),
        assigned_to: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> TaskRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        TaskRepository::new(conn)
    }

    #[test]
    fn completed_at_is_set_only_on_completion() {
        let repo = repo();
        let task = repo
            .create("Deliver towels", None, TaskSource::Auto, TaskPriority::Standard, None, None)
            .unwrap();
        assert!(task.completed_at.is_none());
        repo.update_status(&task.id, TaskStatus::InProgress).unwrap();
        let reloaded = repo.get(&task.id).unwrap().unwrap();
        assert!(reloaded.started_at.is_some());
        assert!(reloaded.completed_at.is_none());
        repo.update_status(&task.id, TaskStatus::Completed).unwrap();
        let reloaded = repo.get(&task.id).unwrap().unwrap();
        assert!(reloaded.completed_at.is_some());
    }
}
