use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::{clean_tags, resolve_subject, RecordError};
use crate::consent::has_capability;
use crate::db::repository;
use crate::models::{Capability, HealthLog, NewHealthLog, Principal};

fn require_patient(principal: &Principal) -> Result<(), RecordError> {
    if principal.is_patient() {
        Ok(())
    } else {
        Err(RecordError::Forbidden("Only patients can manage health logs"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn create_health_log(
    conn: &Connection,
    principal: &Principal,
    input: NewHealthLog,
) -> Result<HealthLog, RecordError> {
    require_patient(principal)?;

    let log = HealthLog {
        id: Uuid::new_v4(),
        patient_id: principal.user_id,
        logged_at: Utc::now(),
        mood: non_blank(input.mood),
        blood_pressure: non_blank(input.blood_pressure),
        sugar_level: non_blank(input.sugar_level),
        symptoms: non_blank(input.symptoms),
        notes: non_blank(input.notes),
        custom_fields: input
            .custom_fields
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v))
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        tags: clean_tags(input.tags),
    };
    repository::insert_health_log(conn, &log)?;
    Ok(log)
}

/// A patient reads their own logs; a doctor needs `view_health_logs`.
pub fn list_health_logs(
    conn: &Connection,
    principal: &Principal,
    patient_id: Option<Uuid>,
) -> Result<Vec<HealthLog>, RecordError> {
    let patient_id = resolve_subject(principal, patient_id)?;
    if principal.is_doctor()
        && !has_capability(conn, &patient_id, &principal.user_id, Capability::ViewHealthLogs)?
    {
        return Err(RecordError::Forbidden(
            "You do not have access to this patient's health logs",
        ));
    }
    Ok(repository::list_health_logs(conn, &patient_id)?)
}

pub fn delete_health_log(
    conn: &Connection,
    principal: &Principal,
    log_id: &Uuid,
) -> Result<(), RecordError> {
    require_patient(principal)?;
    if !repository::delete_health_log(conn, &principal.user_id, log_id)? {
        return Err(RecordError::NotFound("Health log"));
    }
    Ok(())
}
