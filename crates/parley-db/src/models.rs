/// Database row types — these map directly to SQLite rows.
/// Distinct from the parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub password: String,
    pub gender: String,
    pub profile_pic: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: String,
    pub created_at: String,
}
