use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::{ConversationId, MessageId};
use butler_core::time::now_iso8601;

use crate::error::Result;
use crate::models::{DeliveryStatus, Message, MessageDirection, SenderType};

pub struct MessageRepository {
    conn: Mutex<Connection>,
}

impl MessageRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        conversation_id: &ConversationId,
        direction: MessageDirection,
        sender_type: SenderType,
        content: &str,
        content_type: &str,
        confidence: Option<f64>,
        metadata: serde_json::Value,
    ) -> Result<Message> {
        let db = self.conn.lock().unwrap();
        let id = MessageId::new();
        let now = now_iso8601();
        let delivery_status = match direction {
            MessageDirection::Inbound => DeliveryStatus::Delivered,
            MessageDirection::Outbound => DeliveryStatus::Pending,
        };
        db.execute(
            "INSERT INTO messages
                (id, conversation_id, direction, sender_type, content, content_type,
                 confidence, delivery_status, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.as_str(),
                conversation_id.as_str(),
                direction.to_string(),
                sender_type.to_string(),
                content,
                content_type,
                confidence,
                delivery_status.to_string(),
                metadata.to_string(),
                now
            ],
        )?;
        Ok(Message {
            id,
            conversation_id: conversation_id.clone(),
            direction,
            sender_type,
            content: content.to_string(),
            content_type: content_type.to_string(),
            confidence,
            delivery_status,
            metadata,
            created_at: now,
        })
    }

    pub fn update_delivery_status(&self, id: &MessageId, status: DeliveryStatus) -> Result<()> {
        let db = self.conn.lock().unwrap();
        db.execute(
            "UPDATE messages SET delivery_status = ?1 WHERE id = ?2",
            params![status.to_string(), id.as_str()],
        )?;
        Ok(())
    }

    /// Stamp the provider's message id into metadata right after a channel
    /// send, so a later status-callback webhook can find this row via
    /// [`Self::find_by_provider_message_id`].
    pub fn set_channel_message_id(&self, id: &MessageId, channel_message_id: &str) -> Result<()> {
        let db = self.conn.lock().unwrap();
        let metadata_raw: String = db.query_row("SELECT metadata FROM messages WHERE id = ?1", params![id.as_str()], |r| r.get(0))?;
        let mut metadata: serde_json::Value = serde_json::from_str(&metadata_raw).unwrap_or_else(|_| serde_json::json!({}));
        if let serde_json::Value::Object(map) = &mut metadata {
            map.insert("channelMessageId".to_string(), serde_json::json!(channel_message_id));
        }
        db.execute(
            "UPDATE messages SET metadata = ?1 WHERE id = ?2",
            params![metadata.to_string(), id.as_str()],
        )?;
        Ok(())
    }

    /// Last N messages for a conversation, oldest first — feeds the
    /// escalation engine's repetition/history signals.
    pub fn recent_for_conversation(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, direction, sender_type, content, content_type,
                    confidence, delivery_status, metadata, created_at
             FROM messages WHERE conversation_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let mut rows = stmt
            .query_map(params![conversation_id.as_str(), limit as i64], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn count_for_conversation(&self, conversation_id: &ConversationId) -> Result<u64> {
        let db = self.conn.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            params![conversation_id.as_str()],
            |r| r.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn find_by_provider_message_id(&self, field: &str, value: &str) -> Result<Option<Message>> {
        let db = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT id, conversation_id, direction, sender_type, content, content_type,
                    confidence, delivery_status, metadata, created_at
             FROM messages WHERE json_extract(metadata, '$.{field}') = ?1
             ORDER BY created_at DESC LIMIT 1"
        );
        db.query_row(&sql, params![value], row_to_message)
            .optional()
            .map_err(Into::into)
    }
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let direction_raw: String = row.get(2)?;
    let sender_raw: String = row.get(3)?;
    let delivery_raw: String = row.get(7)?;
    let metadata_raw: String = row.get(8)?;
    Ok(Message {
        id: MessageId::from(row.get::<_, String>(0)?),
        conversation_id: ConversationId::from(row.get::<_, String>(1)?),
        direction: MessageDirection::from_str(&direction_raw).unwrap_or(MessageDirection::Inbound),
        sender_type: SenderType::from_str(&sender_raw).unwrap_or(SenderType::System),
        content: row.get(4)?,
        content_type: row.get(5)?,
        confidence: row.get(6)?,
        delivery_status: DeliveryStatus::from_str(&delivery_raw).unwrap_or(DeliveryStatus::Pending),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::json!({})),
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> (MessageRepository, ConversationId) {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO conversations (id, channel_type, channel_id, state, created_at, updated_at)
             VALUES ('conv_1', 'web_chat', 's1', 'new', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        (MessageRepository::new(conn), ConversationId::from("conv_1"))
    }

    #[test]
    fn inbound_and_outbound_persist_in_order() {
        let (repo, conv_id) = repo();
        repo.insert(
            &conv_id,
            MessageDirection::Inbound,
            SenderType::Guest,
            "Hi",
            "text",
            None,
            serde_json::json!({}),
        )
        .unwrap();
        repo.insert(
            &conv_id,
            MessageDirection::Outbound,
            SenderType::Ai,
            "Hello!",
            "text",
            Some(0.9),
            serde_json::json!({}),
        )
        .unwrap();
        let recent = repo.recent_for_conversation(&conv_id, 10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].direction, MessageDirection::Inbound);
        assert_eq!(recent[1].direction, MessageDirection::Outbound);
        assert_eq!(repo.count_for_conversation(&conv_id).unwrap(), 2);
    }
}
