use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::RuleId;
use butler_core::time::now_iso8601;

use crate::error::{PersistenceError, Result};
use crate::models::AutomationRule;

pub struct RuleRepository {
    conn: Mutex<Connection>,
}

impl RuleRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn create(
        &self,
        name: &str,
        description: Option<&str>,
        trigger: serde_json::Value,
        actions: serde_json::Value,
        retry_config: serde_json::Value,
    ) -> Result<AutomationRule> {
        let db = self.conn.lock().unwrap();
        let id = RuleId::new();
        let now = now_iso8601();
        db.execute(
            "INSERT INTO automation_rules
                (id, name, description, trigger, actions, enabled, run_count,
                 consecutive_failures, retry_config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, 0, ?6, ?7, ?7)",
            params![
                id.as_str(),
                name,
                description,
                trigger.to_string(),
                actions.to_string(),
                retry_config.to_string(),
                now
            ],
        )?;
        Ok(AutomationRule {
            id,
            name: name.to_string(),
            description: description.map(String::from),
            trigger,
            actions,
            enabled: true,
            run_count: 0,
            consecutive_failures: 0,
            last_run_at: None,
            last_error: None,
            retry_config,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get(&self, id: &RuleId) -> Result<Option<AutomationRule>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, name, description, trigger, actions, enabled, run_count,
                    consecutive_failures, last_run_at, last_error, retry_config,
                    created_at, updated_at
             FROM automation_rules WHERE id = ?1",
            params![id.as_str()],
            row_to_rule,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_enabled(&self) -> Result<Vec<AutomationRule>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, description, trigger, actions, enabled, run_count,
                    consecutive_failures, last_run_at, last_error, retry_config,
                    created_at, updated_at
             FROM automation_rules WHERE enabled = 1",
        )?;
        let rows = stmt
            .query_map([], row_to_rule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Record a completed run. Resets `consecutive_failures` on success,
    /// increments it on failure, auto-disabling the rule once the ceiling
    /// (spec §4.3 / Open Question) is reached.
    pub fn record_run(&self, id: &RuleId, success: bool, error: Option<&str>, ceiling: u32) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        if success {
            db.execute(
                "UPDATE automation_rules
                 SET run_count = run_count + 1, consecutive_failures = 0,
                     last_run_at = ?1, last_error = NULL, updated_at = ?1
                 WHERE id = ?2",
                params![now, id.as_str()],
            )?;
        } else {
            db.execute(
                "UPDATE automation_rules
                 SET run_count = run_count + 1, consecutive_failures = consecutive_failures + 1,
                     last_run_at = ?1, last_error = ?2, updated_at = ?1
                 WHERE id = ?3",
                params![now, error, id.as_str()],
            )?;
            let failures: u32 = db.query_row(
                "SELECT consecutive_failures FROM automation_rules WHERE id = ?1",
                params![id.as_str()],
                |r| r.get(0),
            )?;
            if failures >= ceiling {
                db.execute(
                    "UPDATE automation_rules SET enabled = 0 WHERE id = ?1",
                    params![id.as_str()],
                )?;
            }
        }
        Ok(())
    }

    pub fn set_enabled(&self, id: &RuleId, enabled: bool) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let changed = db.execute(
            "UPDATE automation_rules SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, now_iso8601(), id.as_str()],
        )?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(format!("rule {id}")));
        }
        Ok(())
    }
}

fn row_to_rule(row: &Row) -> rusqlite::Result<AutomationRule> {
    let trigger_raw: String = row.get(3)?;
    let actions_raw: String = row.get(4)?;
    let retry_raw: String = row.get(10)?;
    Ok(AutomationRule {
        id: RuleId::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        trigger: serde_json::from_str(&trigger_raw).unwrap_or(serde_json::Value::Null),
        actions: serde_json::from_str(&actions_raw).unwrap_or(serde_json::Value::Null),
        enabled: row.get(5)?,
        run_count: row.get::<_, i64>(6)? as u64,
        consecutive_failures: row.get::<_, i64>(7)? as u32,
        last_run_at: row.get(8)?,
        last_error: row.get(9)?,
        retry_config: serde_json::from_str(&retry_raw).unwrap_or(serde_json::Value::Null),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> RuleRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        RuleRepository::new(conn)
    }

    #[test]
    fn auto_disables_at_the_failure_ceiling() {
        let repo = repo();
        let rule = repo
            .create("Pre-arrival welcome", None, serde_json::json!({}), serde_json::json!([]), serde_json::json!(null))
            .unwrap();
        for _ in 0..5 {
            repo.record_run(&rule.id, false, Some("boom"), 5).unwrap();
        }
        let reloaded = repo.get(&rule.id).unwrap().unwrap();
        assert_eq!(reloaded.consecutive_failures, 5);
        assert!(!reloaded.enabled);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let repo = repo();
        let rule = repo
            .create("Checkout survey", None, serde_json::json!({}), serde_json::json!([]), serde_json::json!(null))
            .unwrap();
        repo.record_run(&rule.id, false, Some("boom"), 5).unwrap();
        repo.record_run(&rule.id, true, None, 5).unwrap();
        let reloaded = repo.get(&rule.id).unwrap().unwrap();
        assert_eq!(reloaded.consecutive_failures, 0);
        assert_eq!(reloaded.run_count, 2);
    }
}
