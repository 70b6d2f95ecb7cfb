use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::{ConversationId, GuestId, ReservationId};
use butler_core::time::now_iso8601;

use crate::error::{PersistenceError, Result};
use crate::models::{ChannelType, Conversation, ConversationState};

pub struct ConversationRepository {
    conn: Mutex<Connection>,
}

impl ConversationRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Look up by `(channel_type, channel_id)` or create new in state `new`.
    pub fn get_or_create(
        &self,
        channel_type: ChannelType,
        channel_id: &str,
        guest_id: Option<&GuestId>,
    ) -> Result<Conversation> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        let id = ConversationId::new().to_string();
        db.execute(
            "INSERT OR IGNORE INTO conversations
                (id, channel_type, channel_id, state, guest_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'new', ?4, ?5, ?5)",
            params![
                id,
                channel_type.to_string(),
                channel_id,
                guest_id.map(|g| g.as_str()),
                now
            ],
        )?;
        drop(db);
        self.find(channel_type, channel_id)?.ok_or_else(|| {
            PersistenceError::NotFound(format!("conversation {channel_type}/{channel_id}"))
        })
    }

    pub fn find(&self, channel_type: ChannelType, channel_id: &str) -> Result<Option<Conversation>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, channel_type, channel_id, state, guest_id, reservation_id,
                    created_at, updated_at
             FROM conversations WHERE channel_type = ?1 AND channel_id = ?2",
            params![channel_type.to_string(), channel_id],
            row_to_conversation,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, channel_type, channel_id, state, guest_id, reservation_id,
                    created_at, updated_at
             FROM conversations WHERE id = ?1",
            params![id.as_str()],
            row_to_conversation,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Attach guest/reservation and/or advance state. Rejects transitions
    /// that would move a conversation backwards (spec §8: "states only
    /// progress").
    pub fn update_state(&self, id: &ConversationId, new_state: ConversationState) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let current: String = db.query_row(
            "SELECT state FROM conversations WHERE id = ?1",
            params![id.as_str()],
            |r| r.get(0),
        )?;
        let current = ConversationState::from_str(&current).unwrap_or(ConversationState::New);
        if new_state < current {
            return Err(PersistenceError::Conflict(format!(
                "cannot move conversation {id} from {current} back to {new_state}"
            )));
        }
        let now = now_iso8601();
        db.execute(
            "UPDATE conversations SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![new_state.to_string(), now, id.as_str()],
        )?;
        Ok(())
    }

    pub fn attach_reservation(&self, id: &ConversationId, reservation_id: &ReservationId) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let now = now_iso8601();
        db.execute(
            "UPDATE conversations SET reservation_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![reservation_id.as_str(), now, id.as_str()],
        )?;
        Ok(())
    }

    /// Snapshot used by the stats bridge for the `stats:conversations` topic.
    pub fn state_counts(&self) -> Result<Vec<(ConversationState, u64)>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare("SELECT state, COUNT(*) FROM conversations GROUP BY state")?;
        let rows = stmt
            .query_map([], |row| {
                let state_raw: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((state_raw, count as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(s, c)| ConversationState::from_str(&s).ok().map(|s| (s, c)))
            .collect())
    }
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let channel_type_raw: String = row.get(1)?;
    let state_raw: String = row.get(3)?;
    Ok(Conversation {
        id: ConversationId::from(row.get::<_, String>(0)?),
        channel_type: ChannelType::from_str(&channel_type_raw).unwrap_or(ChannelType::WebChat),
        channel_id: row.get(2)?,
        state: ConversationState::from_str(&state_raw).unwrap_or(ConversationState::New),
        guest_id: row.get::<_, Option<String>>(4)?.map(GuestId::from),
        reservation_id: row.get::<_, Option<String>>(5)?.map(ReservationId::from),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> ConversationRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ConversationRepository::new(conn)
    }

    #[test]
    fn get_or_create_is_idempotent_per_channel_key() {
        let repo = repo();
        let a = repo
            .get_or_create(ChannelType::ShortMessage, "+15551112222", None)
            .unwrap();
        let b = repo
            .get_or_create(ChannelType::ShortMessage, "+15551112222", None)
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.state, ConversationState::New);
    }

    #[test]
    fn state_cannot_move_backwards() {
        let repo = repo();
        let conv = repo
            .get_or_create(ChannelType::WebChat, "session-1", None)
            .unwrap();
        repo.update_state(&conv.id, ConversationState::Escalated)
            .unwrap();
        let err = repo
            .update_state(&conv.id, ConversationState::Active)
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Conflict(_)));
    }
}
