use crate::Database;
use crate::models::{MessageRow, UserRow};
use anyhow::Result;
use rusqlite::OptionalExtension;

/// Normalize an unordered participant pair to its sorted form. Every
/// conversation query goes through this so `(a, b)` and `(b, a)` hit the
/// same row.
fn pair_key<'a>(user_a: &'a str, user_b: &'a str) -> (&'a str, &'a str) {
    if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    }
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        full_name: &str,
        password_hash: &str,
        gender: &str,
        profile_pic: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, full_name, password, gender, profile_pic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, username, full_name, password_hash, gender, profile_pic),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, username, full_name, password, gender, profile_pic, created_at
                     FROM users WHERE username = ?1",
                )?
                .query_row([username], user_from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, username, full_name, password, gender, profile_pic, created_at
                     FROM users WHERE id = ?1",
                )?
                .query_row([id], user_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// All users except the given one, for the client's contact sidebar.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, full_name, password, gender, profile_pic, created_at
                 FROM users WHERE id != ?1 ORDER BY username",
            )?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Conversations --

    /// Find or create the single conversation for an unordered user pair.
    /// `candidate_id` is used only when a new row is created. INSERT OR
    /// IGNORE on the sorted pair makes concurrent first messages converge
    /// on one row instead of creating two.
    pub fn find_or_create_conversation(
        &self,
        candidate_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<String> {
        let (a, b) = pair_key(user_a, user_b);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO conversations (id, participant_a, participant_b)
                 VALUES (?1, ?2, ?3)",
                (candidate_id, a, b),
            )?;
            let id = conn.query_row(
                "SELECT id FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
                (a, b),
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Ordered message history for the pair's conversation. No conversation
    /// means an empty history, not an error.
    pub fn conversation_messages(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        let (a, b) = pair_key(user_a, user_b);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.sender_id, m.receiver_id, m.body, m.created_at
                 FROM conversations c
                 JOIN conversation_messages cm ON cm.conversation_id = c.id
                 JOIN messages m ON m.id = cm.message_id
                 WHERE c.participant_a = ?1 AND c.participant_b = ?2
                 ORDER BY cm.seq",
            )?;
            let rows = stmt
                .query_map((a, b), |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        body: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, sender_id, receiver_id, body, created_at),
            )?;
            Ok(())
        })
    }

    /// Append a message id to the conversation's sequence. This is the only
    /// mutation a conversation sequence ever sees.
    pub fn append_to_conversation(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversation_messages (conversation_id, seq, message_id)
                 VALUES (
                     ?1,
                     (SELECT COALESCE(MAX(seq), 0) + 1
                      FROM conversation_messages WHERE conversation_id = ?1),
                     ?2
                 )",
                (conversation_id, message_id),
            )?;
            conn.execute(
                "UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1",
                [conversation_id],
            )?;
            Ok(())
        })
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        password: row.get(3)?,
        gender: row.get(4)?,
        profile_pic: row.get(5)?,
        created_at: row.get(6)?,
    })
}
