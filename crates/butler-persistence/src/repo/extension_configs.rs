use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::time::now_iso8601;

use crate::error::Result;
use crate::models::{ExtensionCategory, ExtensionConfig};

pub struct ExtensionConfigRepository {
    conn: Mutex<Connection>,
}

impl ExtensionConfigRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn upsert(
        &self,
        id: &str,
        category: ExtensionCategory,
        config: serde_json::Value,
        enabled: bool,
    ) -> Result<ExtensionConfig> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        db.execute(
            "INSERT INTO extension_configs (id, category, config, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                config = excluded.config, enabled = excluded.enabled, updated_at = excluded.updated_at",
            params![id, category.to_string(), config.to_string(), enabled, now],
        )?;
        drop(db);
        self.get(id)?.ok_or_else(|| {
            crate::error::PersistenceError::NotFound(format!("extension config {id}"))
        })
    }

    pub fn record_test_result(&self, id: &str, result: serde_json::Value, error: Option<&str>) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        db.execute(
            "UPDATE extension_configs
             SET last_test_result = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4",
            params![result.to_string(), error, now, id],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ExtensionConfig>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, category, config, enabled, last_test_result, last_error,
                    created_at, updated_at
             FROM extension_configs WHERE id = ?1",
            params![id],
            row_to_config,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_by_category(&self, category: ExtensionCategory) -> Result<Vec<ExtensionConfig>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, category, config, enabled, last_test_result, last_error,
                    created_at, updated_at
             FROM extension_configs WHERE category = ?1",
        )?;
        let rows = stmt
            .query_map(params![category.to_string()], row_to_config)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All adapters currently enabled — the registry uses this at startup
    /// to decide which instances to construct.
    pub fn list_enabled(&self) -> Result<Vec<ExtensionConfig>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, category, config, enabled, last_test_result, last_error,
                    created_at, updated_at
             FROM extension_configs WHERE enabled = 1",
        )?;
        let rows = stmt
            .query_map([], row_to_config)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_config(row: &Row) -> rusqlite::Result<ExtensionConfig> {
    let category_raw: String = row.get(1)?;
    let config_raw: String = row.get(2)?;
    let test_result_raw: Option<String> = row.get(4)?;
    Ok(ExtensionConfig {
        id: row.get(0)?,
        category: ExtensionCategory::from_str(&category_raw).unwrap_or(ExtensionCategory::Channel),
        config: serde_json::from_str(&config_raw).unwrap_or(serde_json::json!({})),
        enabled: row.get(3)?,
        last_test_result: test_result_raw.and_then(|s| serde_json::from_str(&s).ok()),
        last_error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> ExtensionConfigRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ExtensionConfigRepository::new(conn)
    }

    #[test]
    fn upsert_replaces_existing_config() {
        let repo = repo();
        repo.upsert("anthropic", ExtensionCategory::Ai, serde_json::json!({"model": "a"}), true)
            .unwrap();
        repo.upsert("anthropic", ExtensionCategory::Ai, serde_json::json!({"model": "b"}), false)
            .unwrap();
        let cfg = repo.get("anthropic").unwrap().unwrap();
        assert_eq!(cfg.config["model"], "b");
        assert!(!cfg.enabled);
    }
}
