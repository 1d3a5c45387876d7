use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{from_json, parse_uuid, to_json};
use crate::db::DatabaseError;
use crate::models::{MedicalReport, ReportFileMeta, ReportRevision};

const REPORT_COLUMNS: &str =
    "id, patient_id, uploaded_by, file_url, file_name, file_type, uploaded_at, tags";

// Internal row type for MedicalReport mapping
struct ReportRow {
    id: String,
    patient_id: String,
    uploaded_by: String,
    file_url: String,
    file_name: String,
    file_type: String,
    uploaded_at: DateTime<Utc>,
    tags: String,
}

impl ReportRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            uploaded_by: row.get(2)?,
            file_url: row.get(3)?,
            file_name: row.get(4)?,
            file_type: row.get(5)?,
            uploaded_at: row.get(6)?,
            tags: row.get(7)?,
        })
    }
}

fn report_from_row(conn: &Connection, row: ReportRow) -> Result<MedicalReport, DatabaseError> {
    let id = parse_uuid(&row.id, "reports.id")?;
    Ok(MedicalReport {
        update_history: list_report_history(conn, &id)?,
        id,
        patient_id: parse_uuid(&row.patient_id, "reports.patient_id")?,
        uploaded_by: parse_uuid(&row.uploaded_by, "reports.uploaded_by")?,
        file_url: row.file_url,
        file_name: row.file_name,
        file_type: row.file_type,
        uploaded_at: row.uploaded_at,
        tags: from_json(&row.tags, "reports.tags")?,
    })
}

fn insert_report(conn: &Connection, report: &MedicalReport) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO reports (id, patient_id, uploaded_by, file_url, file_name, file_type,
         uploaded_at, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report.id.to_string(),
            report.patient_id.to_string(),
            report.uploaded_by.to_string(),
            report.file_url,
            report.file_name,
            report.file_type,
            report.uploaded_at,
            to_json(&report.tags, "reports.tags")?,
        ],
    )?;
    Ok(())
}

/// Insert a batch in one transaction: every row lands or none does.
pub fn insert_reports(conn: &Connection, reports: &[MedicalReport]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for report in reports {
        insert_report(&tx, report)?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_report(conn: &Connection, id: &Uuid) -> Result<Option<MedicalReport>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"),
            params![id.to_string()],
            ReportRow::read,
        )
        .optional()?;
    row.map(|r| report_from_row(conn, r)).transpose()
}

/// Reports of a patient, newest upload first, each with its history.
pub fn list_reports(conn: &Connection, patient_id: &Uuid) -> Result<Vec<MedicalReport>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports WHERE patient_id = ?1 ORDER BY uploaded_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![patient_id.to_string()], ReportRow::read)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|r| report_from_row(conn, r)).collect()
}

fn list_report_history(conn: &Connection, report_id: &Uuid) -> Result<Vec<ReportRevision>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT updated_at, updated_by, file_url, file_name, file_type, tags
         FROM report_history WHERE report_id = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt
        .query_map(params![report_id.to_string()], |row| {
            Ok((
                row.get::<_, DateTime<Utc>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(updated_at, updated_by, file_url, file_name, file_type, tags)| -> Result<ReportRevision, DatabaseError> {
                Ok(ReportRevision {
                    updated_at,
                    updated_by: parse_uuid(&updated_by, "report_history.updated_by")?,
                    previous_data: ReportFileMeta {
                        file_url,
                        file_name,
                        file_type,
                        tags: from_json(&tags, "report_history.tags")?,
                    },
                })
            },
        )
        .collect()
}

/// Replace the file metadata of a report, first appending the current
/// metadata to its history. Both writes commit together.
pub fn replace_report_file(
    conn: &Connection,
    report_id: &Uuid,
    updated_by: &Uuid,
    replacement: &ReportFileMeta,
) -> Result<MedicalReport, DatabaseError> {
    let tx = conn.unchecked_transaction()?;

    let current = get_report(&tx, report_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "MedicalReport".into(),
        id: report_id.to_string(),
    })?;
    let previous = current.file_meta();
    let seq = current.update_history.len() as i64;
    let now = Utc::now();

    tx.execute(
        "INSERT INTO report_history (report_id, seq, updated_at, updated_by, file_url, file_name,
         file_type, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report_id.to_string(),
            seq,
            now,
            updated_by.to_string(),
            previous.file_url,
            previous.file_name,
            previous.file_type,
            to_json(&previous.tags, "report_history.tags")?,
        ],
    )?;
    tx.execute(
        "UPDATE reports SET file_url = ?2, file_name = ?3, file_type = ?4, tags = ?5,
         uploaded_by = ?6, uploaded_at = ?7
         WHERE id = ?1",
        params![
            report_id.to_string(),
            replacement.file_url,
            replacement.file_name,
            replacement.file_type,
            to_json(&replacement.tags, "reports.tags")?,
            updated_by.to_string(),
            now,
        ],
    )?;

    let updated = get_report(&tx, report_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "MedicalReport".into(),
        id: report_id.to_string(),
    })?;
    tx.commit()?;
    Ok(updated)
}

/// Returns `true` if the report (and its history) was removed.
pub fn delete_report(conn: &Connection, report_id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM reports WHERE id = ?1",
        params![report_id.to_string()],
    )?;
    Ok(deleted > 0)
}
