use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Ordered schema steps. `PRAGMA user_version` records how many have run.
const MIGRATIONS: &[&str] = &[
    // v1: conversations, per-direction threads, messages
    "
    CREATE TABLE conversations (
        id              TEXT PRIMARY KEY,
        app_id          TEXT NOT NULL,
        post_id         TEXT,
        pair_key        TEXT NOT NULL,
        last_message_id TEXT,
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL
    );

    -- One conversation per participant pair and post within a tenant
    CREATE UNIQUE INDEX idx_conversations_identity
        ON conversations(app_id, pair_key, COALESCE(post_id, ''));

    CREATE TABLE threads (
        conversation_id TEXT NOT NULL REFERENCES conversations(id),
        owner_id        TEXT NOT NULL,
        counterpart_id  TEXT NOT NULL,
        unread_count    INTEGER NOT NULL DEFAULT 0 CHECK (unread_count >= 0),
        last_seen_at    INTEGER,
        annotation      INTEGER NOT NULL DEFAULT 0,
        control_flag    INTEGER NOT NULL DEFAULT 0,
        is_pinned       INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (conversation_id, owner_id)
    );

    CREATE INDEX idx_threads_owner
        ON threads(owner_id, counterpart_id);

    CREATE TABLE messages (
        id              TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL REFERENCES conversations(id),
        kind            INTEGER NOT NULL,
        body            TEXT,
        media_ids       TEXT NOT NULL DEFAULT '[]',
        reply_to_id     TEXT REFERENCES messages(id),
        sender_id       TEXT NOT NULL,
        created_at      INTEGER NOT NULL,
        status          INTEGER NOT NULL DEFAULT 0,
        reference_id    TEXT
    );

    CREATE INDEX idx_messages_conversation
        ON messages(conversation_id, created_at, id);
    ",
    // v2: collaborator tables (tenants, media, résumé hand-off)
    "
    CREATE TABLE apps (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        bundle_id   TEXT NOT NULL UNIQUE
    );

    CREATE TABLE media (
        id           TEXT PRIMARY KEY,
        url          TEXT NOT NULL,
        preview_url  TEXT,
        placeholder  TEXT,
        kind         INTEGER NOT NULL,
        redirect_url TEXT,
        title        TEXT,
        size         TEXT,
        expired_at   INTEGER
    );

    CREATE TABLE resume_snapshots (
        id          TEXT PRIMARY KEY,
        app_id      TEXT NOT NULL,
        user_id     TEXT NOT NULL,
        content     TEXT NOT NULL,
        created_at  INTEGER NOT NULL
    );

    CREATE TABLE resume_relations (
        id              TEXT PRIMARY KEY,
        app_id          TEXT NOT NULL,
        user_id         TEXT NOT NULL,
        snapshot_id     TEXT NOT NULL REFERENCES resume_snapshots(id),
        conversation_id TEXT NOT NULL UNIQUE REFERENCES conversations(id),
        post_id         TEXT NOT NULL,
        is_read         INTEGER NOT NULL DEFAULT 0,
        status          INTEGER NOT NULL DEFAULT 0,
        created_at      INTEGER NOT NULL
    );
    ",
];

pub fn run(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let mut version = usize::try_from(current).unwrap_or(0);

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let next = idx + 1;
        if next <= version {
            continue;
        }
        info!("Running migration v{}", next);
        conn.execute_batch(sql)?;
        conn.execute_batch(&format!("PRAGMA user_version = {};", next))?;
        version = next;
    }

    info!("Database migrations complete (schema v{})", version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_schema_once() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        for table in ["conversations", "threads", "messages", "apps", "media", "resume_relations"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }
}
