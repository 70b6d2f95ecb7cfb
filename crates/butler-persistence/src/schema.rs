use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::Connection;

/// Open the database file, apply pragmas, and create every table.
/// Safe to call on every startup — every statement is idempotent.
pub fn open(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    init_db(&conn)?;
    Ok(conn)
}

/// Same as [`open`], accepting any `AsRef<Path>` — used by
/// [`crate::Repositories::open`] to hand each repository its own connection
/// to the same on-disk file (WAL mode makes that safe: one writer at a
/// time, readers never block on it).
pub fn open_path(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    init_db(&conn)?;
    Ok(conn)
}

/// A private, process-unique in-memory database shared across every
/// connection opened against it via SQLite's shared-cache mode. Each call
/// mints a fresh name so independent `Repositories::open_in_memory()` calls
/// (e.g. across parallel tests) never collide.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    use rusqlite::OpenFlags;

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:butler_mem_{n}?mode=memory&cache=shared");
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&uri, flags)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    init_db(&conn)?;
    Ok(conn)
}

fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA foreign_keys = ON;",
    )
}

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    create_guests_table(conn)?;
    create_reservations_table(conn)?;
    create_conversations_table(conn)?;
    create_messages_table(conn)?;
    create_tasks_table(conn)?;
    create_automation_rules_table(conn)?;
    create_automation_executions_table(conn)?;
    create_extension_configs_table(conn)?;
    create_audit_entries_table(conn)?;
    create_knowledge_entries_table(conn)?;
    Ok(())
}

fn create_guests_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS guests (
            id              TEXT PRIMARY KEY,
            phone           TEXT,
            email           TEXT,
            first_name      TEXT,
            last_name       TEXT,
            external_ids    TEXT NOT NULL DEFAULT '{}',
            vip_tier        TEXT,
            loyalty_tier    TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        ) STRICT;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_guests_phone
            ON guests(phone) WHERE phone IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_guests_email
            ON guests(email) WHERE email IS NOT NULL;",
    )
}

fn create_reservations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reservations (
            id                  TEXT PRIMARY KEY,
            confirmation_number TEXT NOT NULL UNIQUE,
            guest_id            TEXT NOT NULL REFERENCES guests(id),
            status              TEXT NOT NULL,
            arrival_date        TEXT NOT NULL,
            departure_date      TEXT NOT NULL,
            room_number         TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_reservations_guest
            ON reservations(guest_id, status);",
    )
}

fn create_conversations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            channel_type    TEXT NOT NULL,
            channel_id      TEXT NOT NULL,
            state           TEXT NOT NULL,
            guest_id        TEXT REFERENCES guests(id),
            reservation_id  TEXT REFERENCES reservations(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(channel_type, channel_id)
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_conversations_guest
            ON conversations(guest_id);",
    )
}

fn create_messages_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES conversations(id),
            direction        TEXT NOT NULL,
            sender_type      TEXT NOT NULL,
            content          TEXT NOT NULL,
            content_type     TEXT NOT NULL DEFAULT 'text',
            confidence       REAL,
            delivery_status  TEXT NOT NULL DEFAULT 'pending',
            metadata         TEXT NOT NULL DEFAULT '{}',
            created_at       TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);",
    )
}

fn create_tasks_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            description     TEXT,
            source          TEXT NOT NULL,
            status          TEXT NOT NULL,
            priority        TEXT NOT NULL,
            guest_id        TEXT REFERENCES guests(id),
            reservation_id  TEXT REFERENCES reservations(id),
            assigned_to     TEXT,
            started_at      TEXT,
            completed_at    TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_tasks_status
            ON tasks(status, priority);",
    )
}

fn create_automation_rules_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS automation_rules (
            id                     TEXT PRIMARY KEY,
            name                   TEXT NOT NULL,
            description            TEXT,
            trigger                TEXT NOT NULL,
            actions                TEXT NOT NULL,
            enabled                INTEGER NOT NULL DEFAULT 1,
            run_count              INTEGER NOT NULL DEFAULT 0,
            consecutive_failures   INTEGER NOT NULL DEFAULT 0,
            last_run_at            TEXT,
            last_error             TEXT,
            retry_config           TEXT NOT NULL DEFAULT 'null',
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_rules_enabled
            ON automation_rules(enabled);",
    )
}

fn create_automation_executions_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS automation_executions (
            id               TEXT PRIMARY KEY,
            rule_id          TEXT NOT NULL REFERENCES automation_rules(id),
            trigger_data     TEXT NOT NULL DEFAULT '{}',
            status           TEXT NOT NULL,
            attempt_number   INTEGER NOT NULL DEFAULT 1,
            next_retry_at    TEXT,
            action_results   TEXT NOT NULL DEFAULT '[]',
            triggered_at     TEXT NOT NULL,
            completed_at     TEXT,
            duration_ms      INTEGER,
            error            TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_executions_poll
            ON automation_executions(status, next_retry_at);
        CREATE INDEX IF NOT EXISTS idx_executions_rule
            ON automation_executions(rule_id);",
    )
}

fn create_extension_configs_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS extension_configs (
            id                 TEXT PRIMARY KEY,
            category           TEXT NOT NULL,
            config             TEXT NOT NULL DEFAULT '{}',
            enabled            INTEGER NOT NULL DEFAULT 0,
            last_test_result   TEXT,
            last_error         TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_extensions_category
            ON extension_configs(category, enabled);",
    )
}

fn create_audit_entries_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_entries (
            id              TEXT PRIMARY KEY,
            actor_type      TEXT NOT NULL,
            actor_id        TEXT NOT NULL,
            action          TEXT NOT NULL,
            resource_type   TEXT NOT NULL,
            resource_id     TEXT NOT NULL,
            details         TEXT NOT NULL DEFAULT '{}',
            client_ip       TEXT,
            user_agent      TEXT,
            created_at      TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_audit_resource
            ON audit_entries(resource_type, resource_id);",
    )
}

fn create_knowledge_entries_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS knowledge_entries (
            id          TEXT PRIMARY KEY,
            topic       TEXT NOT NULL,
            content     TEXT NOT NULL,
            tags        TEXT NOT NULL DEFAULT '',
            embedding   BLOB,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        ) STRICT;
        CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_entries_fts
            USING fts5(topic, content, content='knowledge_entries', content_rowid='rowid');",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
