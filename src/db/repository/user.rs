use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{from_json, parse_uuid, to_json};
use crate::db::DatabaseError;
use crate::models::{ProfileUpdate, Role, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, specialization, age, gender,
     custom_fields, last_seen, created_at, updated_at";

// Internal row type for User mapping
struct UserRow {
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    specialization: Option<String>,
    age: Option<u32>,
    gender: Option<String>,
    custom_fields: String,
    last_seen: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            specialization: row.get(5)?,
            age: row.get(6)?,
            gender: row.get(7)?,
            custom_fields: row.get(8)?,
            last_seen: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

fn user_from_row(row: UserRow) -> Result<User, DatabaseError> {
    Ok(User {
        id: parse_uuid(&row.id, "users.id")?,
        name: row.name,
        email: row.email,
        password_hash: row.password_hash,
        role: Role::from_str(&row.role)?,
        specialization: row.specialization,
        age: row.age,
        gender: row.gender,
        custom_fields: from_json(&row.custom_fields, "users.custom_fields")?,
        last_seen: row.last_seen,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, specialization, age, gender,
         custom_fields, last_seen, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            user.id.to_string(),
            user.name,
            user.email,
            user.password_hash,
            user.role.as_str(),
            user.specialization,
            user.age,
            user.gender,
            to_json(&user.custom_fields, "users.custom_fields")?,
            user.last_seen,
            user.created_at,
            user.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &Uuid) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id.to_string()],
            UserRow::read,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

/// Lookup is case-insensitive (`COLLATE NOCASE` on the column).
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            UserRow::read,
        )
        .optional()?;
    row.map(user_from_row).transpose()
}

pub fn email_exists(conn: &Connection, email: &str) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        params![email],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Apply the fields present in `update`. Returns `false` when the user is gone.
pub fn update_user_profile(
    conn: &Connection,
    id: &Uuid,
    update: &ProfileUpdate,
) -> Result<bool, DatabaseError> {
    let custom_fields = update
        .custom_fields
        .as_ref()
        .map(|fields| to_json(fields, "users.custom_fields"))
        .transpose()?;

    let updated = conn.execute(
        "UPDATE users SET
            name = COALESCE(?2, name),
            specialization = COALESCE(?3, specialization),
            age = COALESCE(?4, age),
            gender = COALESCE(?5, gender),
            custom_fields = COALESCE(?6, custom_fields),
            updated_at = ?7
         WHERE id = ?1",
        params![
            id.to_string(),
            update.name,
            update.specialization,
            update.age,
            update.gender,
            custom_fields,
            Utc::now(),
        ],
    )?;
    Ok(updated > 0)
}

pub fn set_password_hash(conn: &Connection, id: &Uuid, hash: &str) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), hash, Utc::now()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "User".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn touch_last_seen(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET last_seen = ?2 WHERE id = ?1",
        params![id.to_string(), Utc::now()],
    )?;
    Ok(())
}

// ═══════════════════════════════════════════
// Password reset tokens
// ═══════════════════════════════════════════

/// Store the hash of a reset token, replacing any earlier one.
pub fn set_reset_token(
    conn: &Connection,
    id: &Uuid,
    token_hash: &[u8; 32],
    expires_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET reset_token_hash = ?2, reset_token_expires = ?3 WHERE id = ?1",
        params![id.to_string(), &token_hash[..], expires_at],
    )?;
    Ok(())
}

/// Stored reset token hash and expiry, if one is outstanding.
pub fn get_reset_token(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<(Vec<u8>, DateTime<Utc>)>, DatabaseError> {
    let row: Option<(Option<Vec<u8>>, Option<DateTime<Utc>>)> = conn
        .query_row(
            "SELECT reset_token_hash, reset_token_expires FROM users WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match row {
        Some((Some(hash), Some(expires))) => Some((hash, expires)),
        _ => None,
    })
}

pub fn clear_reset_token(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET reset_token_hash = NULL, reset_token_expires = NULL WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(())
}
