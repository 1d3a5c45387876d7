use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{from_json, parse_uuid, to_json};
use crate::db::DatabaseError;
use crate::models::HealthLog;

pub fn insert_health_log(conn: &Connection, log: &HealthLog) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO health_logs (id, patient_id, logged_at, mood, blood_pressure, sugar_level,
         symptoms, notes, custom_fields, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            log.id.to_string(),
            log.patient_id.to_string(),
            log.logged_at,
            log.mood,
            log.blood_pressure,
            log.sugar_level,
            log.symptoms,
            log.notes,
            to_json(&log.custom_fields, "health_logs.custom_fields")?,
            to_json(&log.tags, "health_logs.tags")?,
        ],
    )?;
    Ok(())
}

/// All logs of a patient, newest first.
pub fn list_health_logs(conn: &Connection, patient_id: &Uuid) -> Result<Vec<HealthLog>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, logged_at, mood, blood_pressure, sugar_level, symptoms, notes,
         custom_fields, tags
         FROM health_logs WHERE patient_id = ?1 ORDER BY logged_at DESC",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, DateTime<Utc>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, Option<String>>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut logs = Vec::new();
    for row in rows {
        let (id, patient, logged_at, mood, blood_pressure, sugar_level, symptoms, notes, custom, tags) =
            row?;
        logs.push(HealthLog {
            id: parse_uuid(&id, "health_logs.id")?,
            patient_id: parse_uuid(&patient, "health_logs.patient_id")?,
            logged_at,
            mood,
            blood_pressure,
            sugar_level,
            symptoms,
            notes,
            custom_fields: from_json::<BTreeMap<String, String>>(&custom, "health_logs.custom_fields")?,
            tags: from_json(&tags, "health_logs.tags")?,
        });
    }
    Ok(logs)
}

/// Delete a log only if it belongs to `patient_id`. Returns `true` on removal.
pub fn delete_health_log(
    conn: &Connection,
    patient_id: &Uuid,
    log_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM health_logs WHERE id = ?1 AND patient_id = ?2",
        params![log_id.to_string(), patient_id.to_string()],
    )?;
    Ok(deleted > 0)
}
