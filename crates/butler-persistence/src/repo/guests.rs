use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::GuestId;
use butler_core::time::now_iso8601;

use crate::error::{PersistenceError, Result};
use crate::models::Guest;

/// Guest rows, keyed uniquely by `phone` and by `email` (spec §3: "at most
/// one guest per (phone) and one per (email)").
pub struct GuestRepository {
    conn: Mutex<Connection>,
}

impl GuestRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Insert-or-select by canonical phone. Handles the race where two
    /// threads insert the same first-time sender simultaneously: the
    /// `INSERT OR IGNORE` loses silently, then the read-back finds the
    /// winner's row.
    pub fn upsert_by_phone(&self, phone: &str, placeholder_last_name: &str) -> Result<Guest> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let id = GuestId::new().to_string();
        db.execute(
            "INSERT OR IGNORE INTO guests (id, phone, last_name, external_ids, created_at, updated_at)
             VALUES (?1, ?2, ?3, '{}', ?4, ?4)",
            params![id, phone, placeholder_last_name, now],
        )?;
        self.find_by_phone(phone)?
            .ok_or_else(|| PersistenceError::NotFound(format!("guest with phone {phone}")))
    }

    pub fn upsert_by_email(&self, email: &str) -> Result<Guest> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let id = GuestId::new().to_string();
        db.execute(
            "INSERT OR IGNORE INTO guests (id, email, external_ids, created_at, updated_at)
             VALUES (?1, ?2, '{}', ?3, ?3)",
            params![id, email, now],
        )?;
        self.find_by_email(email)?
            .ok_or_else(|| PersistenceError::NotFound(format!("guest with email {email}")))
    }

    pub fn find_by_phone(&self, phone: &str) -> Result<Option<Guest>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, phone, email, first_name, last_name, external_ids, vip_tier,
                    loyalty_tier, created_at, updated_at
             FROM guests WHERE phone = ?1",
            params![phone],
            row_to_guest,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<Guest>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, phone, email, first_name, last_name, external_ids, vip_tier,
                    loyalty_tier, created_at, updated_at
             FROM guests WHERE email = ?1",
            params![email],
            row_to_guest,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get(&self, id: &GuestId) -> Result<Option<Guest>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, phone, email, first_name, last_name, external_ids, vip_tier,
                    loyalty_tier, created_at, updated_at
             FROM guests WHERE id = ?1",
            params![id.as_str()],
            row_to_guest,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Upsert from a PMS sync (spec §6: "`NormalizedGuest` ... externalId/
    /// source pair used for upsert"). Matches an existing row by phone then
    /// email, merging the `(source -> externalId)` pair into `external_ids`
    /// rather than overwriting it, so a guest known to two PMS sources keeps
    /// both mappings.
    pub fn upsert_from_pms(
        &self,
        source: &str,
        external_id: &str,
        phone: Option<&str>,
        email: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
        vip_tier: Option<&str>,
        loyalty_tier: Option<&str>,
    ) -> Result<Guest> {
        let existing = match phone.map(|p| self.find_by_phone(p)).transpose()?.flatten() {
            Some(g) => Some(g),
            None => email.map(|e| self.find_by_email(e)).transpose()?.flatten(),
        };

        let id = existing.as_ref().map(|g| g.id.to_string()).unwrap_or_else(|| GuestId::new().to_string());
        let mut external_ids = match existing.as_ref().map(|g| g.external_ids.clone()) {
            Some(serde_json::Value::Object(m)) => m,
            _ => serde_json::Map::new(),
        };
        external_ids.insert(source.to_string(), serde_json::Value::String(external_id.to_string()));
        let external_ids_json = serde_json::Value::Object(external_ids).to_string();

        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        db.execute(
            "INSERT INTO guests (id, phone, email, first_name, last_name, external_ids, vip_tier, loyalty_tier, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(id) DO UPDATE SET
                phone = COALESCE(excluded.phone, guests.phone),
                email = COALESCE(excluded.email, guests.email),
                first_name = COALESCE(excluded.first_name, guests.first_name),
                last_name = COALESCE(excluded.last_name, guests.last_name),
                external_ids = excluded.external_ids,
                vip_tier = COALESCE(excluded.vip_tier, guests.vip_tier),
                loyalty_tier = COALESCE(excluded.loyalty_tier, guests.loyalty_tier),
                updated_at = excluded.updated_at",
            params![id, phone, email, first_name, last_name, external_ids_json, vip_tier, loyalty_tier, now],
        )?;
        drop(db);
        self.get(&GuestId::from(id.as_str()))?
            .ok_or_else(|| PersistenceError::NotFound(format!("guest {id}")))
    }

    pub fn set_vip_tier(&self, id: &GuestId, tier: Option<&str>) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let changed = db.execute(
            "UPDATE guests SET vip_tier = ?1, updated_at = ?2 WHERE id = ?3",
            params![tier, now, id.as_str()],
        )?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(format!("guest {id}")));
        }
        Ok(())
    }
}

fn row_to_guest(row: &Row) -> rusqlite::Result<Guest> {
    let external_ids_raw: String = row.get(5)?;
    Ok(Guest {
        id: GuestId::from(row.get::<_, String>(0)?),
        phone: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        external_ids: serde_json::from_str(&external_ids_raw).unwrap_or(serde_json::json!({})),
        vip_tier: row.get(6)?,
        loyalty_tier: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> GuestRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        GuestRepository::new(conn)
    }

    #[test]
    fn upsert_by_phone_is_idempotent() {
        let repo = repo();
        let a = repo.upsert_by_phone("+15551112222", "2222").unwrap();
        let b = repo.upsert_by_phone("+15551112222", "2222").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.last_name.as_deref(), Some("2222"));
    }

    #[test]
    fn distinct_phones_produce_distinct_guests() {
        let repo = repo();
        let a = repo.upsert_by_phone("+15551112222", "2222").unwrap();
        let b = repo.upsert_by_phone("+15559998888", "8888").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn upsert_from_pms_matches_by_phone_and_merges_external_ids() {
        let repo = repo();
        let first = repo
            .upsert_from_pms("opera", "OP-1", Some("+15551112222"), None, Some("Jane"), Some("Doe"), Some("gold"), None)
            .unwrap();
        assert_eq!(first.external_ids["opera"], "OP-1");
        assert_eq!(first.vip_tier.as_deref(), Some("gold"));

        let second = repo
            .upsert_from_pms("mews", "M-9", Some("+15551112222"), None, None, None, None, Some("platinum"))
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.external_ids["opera"], "OP-1");
        assert_eq!(second.external_ids["mews"], "M-9");
        assert_eq!(second.first_name.as_deref(), Some("Jane"));
        assert_eq!(second.vip_tier.as_deref(), Some("gold"));
        assert_eq!(second.loyalty_tier.as_deref(), Some("platinum"));
    }

    #[test]
    fn upsert_from_pms_with_no_match_creates_a_new_guest() {
        let repo = repo();
        let guest = repo
            .upsert_from_pms("opera", "OP-2", Some("+15553334444"), Some("a@example.com"), None, None, None, None)
            .unwrap();
        assert_eq!(guest.phone.as_deref(), Some("+15553334444"));
        assert_eq!(guest.email.as_deref(), Some("a@example.com"));
    }
}
