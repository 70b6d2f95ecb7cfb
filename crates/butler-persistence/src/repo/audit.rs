use std::sync::Mutex;

use rusqlite::{params, Connection, Row};

use butler_core::ids::AuditId;
use butler_core::time::now_iso8601;

use crate::error::Result;
use crate::models::AuditEntry;

/// Insert-only audit log. Entries are never updated or deleted.
pub struct AuditRepository {
    conn: Mutex<Connection>,
}

impl AuditRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        actor_type: &str,
        actor_id: &str,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        details: serde_json::Value,
        client_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<AuditEntry> {
        let db = self.conn.lock().unwrap();
        let id = AuditId::new();
        let now = now_iso8601();
        db.execute(
            "INSERT INTO audit_entries
                (id, actor_type, actor_id, action, resource_type, resource_id, details,
                 client_ip, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.as_str(),
                actor_type,
                actor_id,
                action,
                resource_type,
                resource_id,
                details.to_string(),
                client_ip,
                user_agent,
                now
            ],
        )?;
        Ok(AuditEntry {
            id,
            actor_type: actor_type.to_string(),
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details,
            client_ip: client_ip.map(String::from),
            user_agent: user_agent.map(String::from),
            created_at: now,
        })
    }

    pub fn list_for_resource(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditEntry>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, actor_type, actor_id, action, resource_type, resource_id, details,
                    client_ip, user_agent, created_at
             FROM audit_entries WHERE resource_type = ?1 AND resource_id = ?2
             ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![resource_type, resource_id], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
    let details_raw: String = row.get(6)?;
    Ok(AuditEntry {
        id: AuditId::from(row.get::<_, String>(0)?),
        actor_type: row.get(1)?,
        actor_id: row.get(2)?,
        action: row.get(3)?,
        resource_type: row.get(4)?,
        resource_id: row.get(5)?,
        details: serde_json::from_str(&details_raw).unwrap_or(serde_json::json!({})),
        client_ip: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: row.get(9)?,
    })
}
