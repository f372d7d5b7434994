use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            full_name   TEXT NOT NULL,
            password    TEXT NOT NULL,
            gender      TEXT NOT NULL CHECK (gender IN ('male', 'female')),
            profile_pic TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Participants are stored sorted so the unordered pair maps to
        -- exactly one row.
        CREATE TABLE IF NOT EXISTS conversations (
            id            TEXT PRIMARY KEY,
            participant_a TEXT NOT NULL REFERENCES users(id),
            participant_b TEXT NOT NULL REFERENCES users(id),
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(participant_a, participant_b)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- Append-only per-conversation ordering. seq is assigned at append
        -- time and never rewritten.
        CREATE TABLE IF NOT EXISTS conversation_messages (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            seq             INTEGER NOT NULL,
            message_id      TEXT NOT NULL REFERENCES messages(id),
            PRIMARY KEY (conversation_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_messages_message
            ON conversation_messages(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
