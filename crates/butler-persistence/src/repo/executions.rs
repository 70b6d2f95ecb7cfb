use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::{ExecutionId, RuleId};
use butler_core::time::now_iso8601;

use crate::error::Result;
use crate::models::{AutomationExecution, ExecutionStatus};

pub struct ExecutionRepository {
    conn: Mutex<Connection>,
}

impl ExecutionRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn create_pending(
        &self,
        rule_id: &RuleId,
        trigger_data: serde_json::Value,
        attempt_number: u32,
    ) -> Result<AutomationExecution> {
        let db = self.conn.lock().unwrap();
        let id = ExecutionId::new();
        let now = now_iso8601();
        db.execute(
            "INSERT INTO automation_executions
                (id, rule_id, trigger_data, status, attempt_number, triggered_at)
             VALUES (?1, ?2, ?3, 'running', ?4, ?5)",
            params![
                id.as_str(),
                rule_id.as_str(),
                trigger_data.to_string(),
                attempt_number,
                now
            ],
        )?;
        Ok(AutomationExecution {
            id,
            rule_id: rule_id.clone(),
            trigger_data,
            status: ExecutionStatus::Running,
            attempt_number,
            next_retry_at: None,
            action_results: serde_json::json!([]),
            triggered_at: now,
            completed_at: None,
            duration_ms: None,
            error: None,
        })
    }

    /// Record a terminal or retry-pending outcome.
    #[allow(clippy::too_many_arguments)]
    pub fn record_outcome(
        &self,
        id: &ExecutionId,
        status: ExecutionStatus,
        action_results: serde_json::Value,
        duration_ms: u64,
        error: Option<&str>,
        next_retry_at: Option<&str>,
    ) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let completed_at = if matches!(status, ExecutionStatus::Pending) {
            None
        } else {
            Some(now.as_str())
        };
        db.execute(
            "UPDATE automation_executions
             SET status = ?1, action_results = ?2, duration_ms = ?3, error = ?4,
                 next_retry_at = ?5, completed_at = ?6
             WHERE id = ?7",
            params![
                status.to_string(),
                action_results.to_string(),
                duration_ms,
                error,
                next_retry_at,
                completed_at,
                id.as_str()
            ],
        )?;
        Ok(())
    }

    /// Atomically claim a batch of due retries: `pending -> running` guarded
    /// by `next_retry_at <= now`, so the same row is never picked up twice
    /// across concurrent ticks.
    pub fn claim_due_retries(&self, now: &str, batch_size: usize) -> Result<Vec<AutomationExecution>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id FROM automation_executions
             WHERE status = 'pending' AND next_retry_at <= ?1
             ORDER BY next_retry_at ASC LIMIT ?2",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![now, batch_size as i64], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let changed = db.execute(
                "UPDATE automation_executions SET status = 'running'
                 WHERE id = ?1 AND status = 'pending'",
                params![id],
            )?;
            if changed == 1 {
                if let Some(exec) = db
                    .query_row(
                        "SELECT id, rule_id, trigger_data, status, attempt_number, next_retry_at,
                                action_results, triggered_at, completed_at, duration_ms, error
                         FROM automation_executions WHERE id = ?1",
                        params![id],
                        row_to_execution,
                    )
                    .optional()?
                {
                    claimed.push(exec);
                }
            }
        }
        Ok(claimed)
    }

    pub fn get(&self, id: &ExecutionId) -> Result<Option<AutomationExecution>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, rule_id, trigger_data, status, attempt_number, next_retry_at,
                    action_results, triggered_at, completed_at, duration_ms, error
             FROM automation_executions WHERE id = ?1",
            params![id.as_str()],
            row_to_execution,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_for_rule(&self, rule_id: &RuleId) -> Result<Vec<AutomationExecution>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, rule_id, trigger_data, status, attempt_number, next_retry_at,
                    action_results, triggered_at, completed_at, duration_ms, error
             FROM automation_executions WHERE rule_id = ?1 ORDER BY triggered_at DESC",
        )?;
        let rows = stmt
            .query_map(params![rule_id.as_str()], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_execution(row: &Row) -> rusqlite::Result<AutomationExecution> {
    let status_raw: String = row.get(3)?;
    let trigger_data_raw: String = row.get(2)?;
    let action_results_raw: String = row.get(6)?;
    Ok(AutomationExecution {
        id: ExecutionId::from(row.get::<_, String>(0)?),
        rule_id: RuleId::from(row.get::<_, String>(1)?),
        trigger_data: serde_json::from_str(&trigger_data_raw).unwrap_or(serde_json::json!({})),
        status: ExecutionStatus::from_str(&status_raw).unwrap_or(ExecutionStatus::Failed),
        attempt_number: row.get::<_, i64>(4)? as u32,
        next_retry_at: row.get(5)?,
        action_results: serde_json::from_str(&action_results_raw).unwrap_or(serde_json::json!([])),
        triggered_at: row.get(7)?,
        completed_at: row.get(8)?,
        duration_ms: row.get::<_, Option<i64>>(9)?.map(|v| v as u64),
        error: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> ExecutionRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ExecutionRepository::new(conn)
    }

    #[test]
    fn claim_due_retries_performs_zero_writes_on_empty_queue() {
        let repo = repo();
        let claimed = repo.claim_due_retries("2026-01-01T00:00:00Z", 10).unwrap();
        assert!(claimed.is_empty());
    }

    #[test]
    fn claim_due_retries_does_not_double_claim() {
        let repo = repo();
        let rule_id = RuleId::new();
        let exec = repo
            .create_pending(&rule_id, serde_json::json!({}), 1)
            .unwrap();
        repo.record_outcome(
            &exec.id,
            ExecutionStatus::Pending,
            serde_json::json!([]),
            5,
            Some("failed"),
            Some("2020-01-01T00:00:00Z"),
        )
        .unwrap();
        let claimed = repo.claim_due_retries("2026-01-01T00:00:00Z", 10).unwrap();
        assert_eq!(claimed.len(), 1);
        let claimed_again = repo.claim_due_retries("2026-01-01T00:00:00Z", 10).unwrap();
        assert!(claimed_again.is_empty());
    }
}
