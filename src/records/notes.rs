use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::{clean_tags, resolve_subject, RecordError};
use crate::consent::{has_capability, is_connected};
use crate::db::repository;
use crate::models::{Capability, DoctorNote, NewDoctorNote, Principal};

/// Only a doctor connected to the patient may write a note.
pub fn create_note(
    conn: &Connection,
    principal: &Principal,
    input: NewDoctorNote,
) -> Result<DoctorNote, RecordError> {
    if !principal.is_doctor() {
        return Err(RecordError::Forbidden("Only doctors can write notes"));
    }
    let patient_id = resolve_subject(principal, input.patient_id)?;
    let title = input.title.trim().to_string();
    if title.is_empty() {
        return Err(RecordError::BadRequest("Title is required".into()));
    }
    if !is_connected(conn, &patient_id, &principal.user_id)? {
        return Err(RecordError::Forbidden("You are not connected to this patient"));
    }

    let note = DoctorNote {
        id: Uuid::new_v4(),
        patient_id,
        doctor_id: principal.user_id,
        written_at: Utc::now(),
        title,
        diagnosis: input.diagnosis,
        treatment_notes: input.treatment_notes,
        tags: clean_tags(input.tags),
    };
    repository::insert_note(conn, &note)?;

    tracing::info!(
        patient_id = %patient_id,
        doctor_id = %principal.user_id,
        note_id = %note.id,
        "Doctor note written"
    );
    Ok(note)
}

/// Patients see every note about them. A connected doctor sees their own
/// notes, or all notes when granted `view_past_notes`.
pub fn list_notes(
    conn: &Connection,
    principal: &Principal,
    patient_id: Option<Uuid>,
) -> Result<Vec<DoctorNote>, RecordError> {
    let patient_id = resolve_subject(principal, patient_id)?;
    if principal.is_patient() {
        return Ok(repository::list_notes(conn, &patient_id, None)?);
    }

    if !is_connected(conn, &patient_id, &principal.user_id)? {
        return Err(RecordError::Forbidden("You are not connected to this patient"));
    }
    let author = if has_capability(conn, &patient_id, &principal.user_id, Capability::ViewPastNotes)? {
        None
    } else {
        Some(&principal.user_id)
    };
    Ok(repository::list_notes(conn, &patient_id, author)?)
}
