use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;

/// Persist a bearer session. Only the SHA-256 of the token is stored.
pub fn insert_session(
    conn: &Connection,
    token_hash: &[u8; 32],
    user_id: &Uuid,
    expires_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![&token_hash[..], user_id.to_string(), Utc::now(), expires_at],
    )?;
    Ok(())
}

/// Resolve a token hash to its user, ignoring expired sessions.
pub fn find_session_user(
    conn: &Connection,
    token_hash: &[u8; 32],
) -> Result<Option<Uuid>, DatabaseError> {
    let user_id: Option<String> = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
            params![&token_hash[..], Utc::now()],
            |row| row.get(0),
        )
        .optional()?;
    user_id
        .map(|id| parse_uuid(&id, "sessions.user_id"))
        .transpose()
}

/// Returns `true` if a session was removed.
pub fn delete_session(conn: &Connection, token_hash: &[u8; 32]) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?1",
        params![&token_hash[..]],
    )?;
    Ok(deleted > 0)
}

pub fn delete_sessions_for_user(conn: &Connection, user_id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE user_id = ?1",
        params![user_id.to_string()],
    )?;
    Ok(deleted)
}

/// Drop sessions past their expiry. Called at startup.
pub fn purge_expired_sessions(conn: &Connection) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM sessions WHERE expires_at <= ?1",
        params![Utc::now()],
    )?;
    Ok(deleted)
}
