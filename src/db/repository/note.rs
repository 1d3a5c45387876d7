use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{from_json, parse_uuid, to_json};
use crate::db::DatabaseError;
use crate::models::DoctorNote;

pub fn insert_note(conn: &Connection, note: &DoctorNote) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_notes (id, patient_id, doctor_id, written_at, title, diagnosis,
         treatment_notes, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            note.id.to_string(),
            note.patient_id.to_string(),
            note.doctor_id.to_string(),
            note.written_at,
            note.title,
            note.diagnosis,
            note.treatment_notes,
            to_json(&note.tags, "doctor_notes.tags")?,
        ],
    )?;
    Ok(())
}

/// Notes about a patient, newest first. `author` narrows to one doctor.
pub fn list_notes(
    conn: &Connection,
    patient_id: &Uuid,
    author: Option<&Uuid>,
) -> Result<Vec<DoctorNote>, DatabaseError> {
    let mut sql = String::from(
        "SELECT id, patient_id, doctor_id, written_at, title, diagnosis, treatment_notes, tags
         FROM doctor_notes WHERE patient_id = ?1",
    );
    let mut params_vec: Vec<String> = vec![patient_id.to_string()];
    if let Some(doctor_id) = author {
        sql.push_str(" AND doctor_id = ?2");
        params_vec.push(doctor_id.to_string());
    }
    sql.push_str(" ORDER BY written_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, DateTime<Utc>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut notes = Vec::new();
    for row in rows {
        let (id, patient, doctor, written_at, title, diagnosis, treatment_notes, tags) = row?;
        notes.push(DoctorNote {
            id: parse_uuid(&id, "doctor_notes.id")?,
            patient_id: parse_uuid(&patient, "doctor_notes.patient_id")?,
            doctor_id: parse_uuid(&doctor, "doctor_notes.doctor_id")?,
            written_at,
            title,
            diagnosis,
            treatment_notes,
            tags: from_json(&tags, "doctor_notes.tags")?,
        });
    }
    Ok(notes)
}
