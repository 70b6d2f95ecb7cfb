use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use butler_core::ids::KnowledgeId;
use butler_core::time::now_iso8601;

use crate::error::Result;
use crate::models::KnowledgeEntry;

/// Knowledge base entries, indexed by an FTS5 mirror for keyword retrieval
/// and carrying an optional dense embedding for semantic search/dedup.
pub struct KnowledgeRepository {
    conn: Mutex<Connection>,
}

impl KnowledgeRepository {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn upsert(
        &self,
        topic: &str,
        content: &str,
        tags: &str,
        embedding: Option<&[f32]>,
    ) -> Result<KnowledgeEntry> {
        let db = self.conn.lock().unwrap();
        let id = KnowledgeId::new();
        let now = now_iso8601();
        let blob = embedding.map(encode_embedding);
        db.execute(
            "INSERT INTO knowledge_entries (id, topic, content, tags, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id.as_str(), topic, content, tags, blob, now],
        )?;
        let rowid = db.last_insert_rowid();
        db.execute(
            "INSERT INTO knowledge_entries_fts(rowid, topic, content) VALUES (?1, ?2, ?3)",
            params![rowid, topic, content],
        )?;
        Ok(KnowledgeEntry {
            id,
            topic: topic.to_string(),
            content: content.to_string(),
            tags: tags.to_string(),
            embedding: embedding.map(|e| e.to_vec()),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Full-text search over topic/content, returning the highest-scoring
    /// matches first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT k.id, k.topic, k.content, k.tags, k.embedding, k.created_at, k.updated_at
             FROM knowledge_entries_fts f
             JOIN knowledge_entries k ON k.rowid = f.rowid
             WHERE knowledge_entries_fts MATCH ?1
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![query, limit as i64], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get(&self, id: &KnowledgeId) -> Result<Option<KnowledgeEntry>> {
        let db = self.conn.lock().unwrap();
        db.query_row(
            "SELECT id, topic, content, tags, embedding, created_at, updated_at
             FROM knowledge_entries WHERE id = ?1",
            params![id.as_str()],
            row_to_entry,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn list_all(&self) -> Result<Vec<KnowledgeEntry>> {
        let db = self.conn.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, topic, content, tags, embedding, created_at, updated_at
             FROM knowledge_entries ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Length-prefixed f32 vector, per spec §6 ("embeddings stored either as
/// length-prefixed vectors or as a JSON array of floats" — this repository
/// picks the binary form for compactness).
fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + vec.len() * 4);
    buf.extend_from_slice(&(vec.len() as u32).to_le_bytes());
    for v in vec {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() < 4 {
        return None;
    }
    let len = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
    let mut out = Vec::with_capacity(len);
    let mut offset = 4;
    for _ in 0..len {
        let chunk = bytes.get(offset..offset + 4)?;
        out.push(f32::from_le_bytes(chunk.try_into().ok()?));
        offset += 4;
    }
    Some(out)
}

fn row_to_entry(row: &Row) -> rusqlite::Result<KnowledgeEntry> {
    let embedding_raw: Option<Vec<u8>> = row.get(4)?;
    Ok(KnowledgeEntry {
        id: KnowledgeId::from(row.get::<_, String>(0)?),
        topic: row.get(1)?,
        content: row.get(2)?,
        tags: row.get(3)?,
        embedding: embedding_raw.and_then(|b| decode_embedding(&b)),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_db;

    fn repo() -> KnowledgeRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        KnowledgeRepository::new(conn)
    }

    #[test]
    fn embedding_round_trips_through_the_blob_column() {
        let repo = repo();
        let vec = vec![0.1_f32, -0.2, 0.3];
        let entry = repo
            .upsert("checkout time", "Checkout is at 11am.", "policy", Some(&vec))
            .unwrap();
        let reloaded = repo.get(&entry.id).unwrap().unwrap();
        assert_eq!(reloaded.embedding.unwrap(), vec);
    }

    #[test]
    fn full_text_search_finds_by_keyword() {
        let repo = repo();
        repo.upsert("checkout time", "Checkout is at 11am.", "policy", None)
            .unwrap();
        repo.upsert("pool hours", "The pool closes at 9pm.", "amenities", None)
            .unwrap();
        let hits = repo.search("checkout", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].topic, "checkout time");
    }
}
