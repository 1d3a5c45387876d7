use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection as SqlConnection, OptionalExtension, Row};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::{Connection, ConnectionStatus, ConnectionView};

const CONNECTION_COLUMNS: &str = "c.patient_id, c.doctor_id, c.status, c.request_message,
     c.requested_at, c.connected_at, c.pinned, c.chat_enabled, c.view_past_notes,
     c.reports_access, c.update_records, c.view_health_logs";

// Internal row type for Connection mapping
struct ConnectionRow {
    patient_id: String,
    doctor_id: String,
    status: String,
    request_message: Option<String>,
    requested_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    flags: [bool; 6],
}

impl ConnectionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            patient_id: row.get(0)?,
            doctor_id: row.get(1)?,
            status: row.get(2)?,
            request_message: row.get(3)?,
            requested_at: row.get(4)?,
            connected_at: row.get(5)?,
            flags: [
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
            ],
        })
    }
}

fn connection_from_row(row: ConnectionRow) -> Result<Connection, DatabaseError> {
    let [pinned, chat_enabled, view_past_notes, reports_access, update_records, view_health_logs] =
        row.flags;
    Ok(Connection {
        patient_id: parse_uuid(&row.patient_id, "connections.patient_id")?,
        doctor_id: parse_uuid(&row.doctor_id, "connections.doctor_id")?,
        status: ConnectionStatus::from_str(&row.status)?,
        request_message: row.request_message,
        requested_at: row.requested_at,
        connected_at: row.connected_at,
        pinned,
        chat_enabled,
        view_past_notes,
        reports_access,
        update_records,
        view_health_logs,
    })
}

pub fn insert_connection(conn: &SqlConnection, c: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO connections (patient_id, doctor_id, status, request_message, requested_at,
         connected_at, pinned, chat_enabled, view_past_notes, reports_access, update_records,
         view_health_logs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            c.patient_id.to_string(),
            c.doctor_id.to_string(),
            c.status.as_str(),
            c.request_message,
            c.requested_at,
            c.connected_at,
            c.pinned,
            c.chat_enabled,
            c.view_past_notes,
            c.reports_access,
            c.update_records,
            c.view_health_logs,
        ],
    )?;
    Ok(())
}

pub fn get_connection(
    conn: &SqlConnection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
) -> Result<Option<Connection>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {CONNECTION_COLUMNS} FROM connections c
                 WHERE c.patient_id = ?1 AND c.doctor_id = ?2"
            ),
            params![patient_id.to_string(), doctor_id.to_string()],
            ConnectionRow::read,
        )
        .optional()?;
    row.map(connection_from_row).transpose()
}

/// Write back status, connection time and flags. `request_message` and
/// `requested_at` are immutable and never rewritten.
pub fn update_connection(conn: &SqlConnection, c: &Connection) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE connections SET status = ?3, connected_at = ?4, pinned = ?5, chat_enabled = ?6,
         view_past_notes = ?7, reports_access = ?8, update_records = ?9, view_health_logs = ?10
         WHERE patient_id = ?1 AND doctor_id = ?2",
        params![
            c.patient_id.to_string(),
            c.doctor_id.to_string(),
            c.status.as_str(),
            c.connected_at,
            c.pinned,
            c.chat_enabled,
            c.view_past_notes,
            c.reports_access,
            c.update_records,
            c.view_health_logs,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Connection".into(),
            id: format!("{}:{}", c.patient_id, c.doctor_id),
        });
    }
    Ok(())
}

/// Remove the pair's row, optionally only when it has `status`.
/// Returns the number of rows removed (0 or 1).
pub fn delete_connection(
    conn: &SqlConnection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
    status: Option<ConnectionStatus>,
) -> Result<usize, DatabaseError> {
    let deleted = match status {
        Some(status) => conn.execute(
            "DELETE FROM connections WHERE patient_id = ?1 AND doctor_id = ?2 AND status = ?3",
            params![patient_id.to_string(), doctor_id.to_string(), status.as_str()],
        )?,
        None => conn.execute(
            "DELETE FROM connections WHERE patient_id = ?1 AND doctor_id = ?2",
            params![patient_id.to_string(), doctor_id.to_string()],
        )?,
    };
    Ok(deleted)
}

/// Number of connection rows a patient owns, any status.
#[cfg(test)]
pub fn count_patient_connections(conn: &SqlConnection, patient_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM connections WHERE patient_id = ?1",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Patient side: own rows joined with the doctor's name and email.
pub fn list_patient_connections(
    conn: &SqlConnection,
    patient_id: &Uuid,
    status: Option<ConnectionStatus>,
) -> Result<Vec<ConnectionView>, DatabaseError> {
    list_views(conn, "c.patient_id", "c.doctor_id", patient_id, status)
}

/// Doctor side: reverse lookup through `idx_connections_doctor`, joined
/// with the patient's name and email.
pub fn list_doctor_connections(
    conn: &SqlConnection,
    doctor_id: &Uuid,
    status: Option<ConnectionStatus>,
) -> Result<Vec<ConnectionView>, DatabaseError> {
    list_views(conn, "c.doctor_id", "c.patient_id", doctor_id, status)
}

fn list_views(
    conn: &SqlConnection,
    owner_column: &str,
    counterpart_column: &str,
    owner_id: &Uuid,
    status: Option<ConnectionStatus>,
) -> Result<Vec<ConnectionView>, DatabaseError> {
    let mut sql = format!(
        "SELECT {CONNECTION_COLUMNS}, u.id, u.name, u.email
         FROM connections c
         JOIN users u ON u.id = {counterpart_column}
         WHERE {owner_column} = ?1"
    );
    if status.is_some() {
        sql.push_str(" AND c.status = ?2");
    }
    sql.push_str(" ORDER BY c.pinned DESC, c.requested_at ASC");

    let mut stmt = conn.prepare(&sql)?;
    let map_row = |row: &Row<'_>| -> rusqlite::Result<(ConnectionRow, String, String, String)> {
        Ok((ConnectionRow::read(row)?, row.get(12)?, row.get(13)?, row.get(14)?))
    };
    let rows = match status {
        Some(status) => stmt
            .query_map(params![owner_id.to_string(), status.as_str()], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![owner_id.to_string()], map_row)?
            .collect::<Result<Vec<_>, _>>()?,
    };

    rows.into_iter()
        .map(|(row, counterpart_id, name, email)| -> Result<ConnectionView, DatabaseError> {
            let c = connection_from_row(row)?;
            Ok(ConnectionView {
                counterpart_id: parse_uuid(&counterpart_id, "users.id")?,
                name,
                email,
                status: c.status,
                request_message: c.request_message,
                requested_at: c.requested_at,
                connected_at: c.connected_at,
                pinned: c.pinned,
                chat_enabled: c.chat_enabled,
                view_past_notes: c.view_past_notes,
                reports_access: c.reports_access,
                update_records: c.update_records,
                view_health_logs: c.view_health_logs,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{seed_doctor, seed_patient};
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn, "Ada");
        let d = seed_doctor(&conn, "Grey");
        let c = Connection::pending(p.id, d.id, Some("follow-up".into()));
        insert_connection(&conn, &c).unwrap();

        let loaded = get_connection(&conn, &p.id, &d.id).unwrap().unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn composite_key_rejects_second_row() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn, "Ada");
        let d = seed_doctor(&conn, "Grey");
        insert_connection(&conn, &Connection::pending(p.id, d.id, None)).unwrap();
        let err = insert_connection(&conn, &Connection::pending(p.id, d.id, None)).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn status_filtered_delete_leaves_other_status() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn, "Ada");
        let d = seed_doctor(&conn, "Grey");
        let mut c = Connection::pending(p.id, d.id, None);
        c.status = ConnectionStatus::Connected;
        insert_connection(&conn, &c).unwrap();

        let removed = delete_connection(&conn, &p.id, &d.id, Some(ConnectionStatus::Pending)).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(count_patient_connections(&conn, &p.id).unwrap(), 1);
    }

    #[test]
    fn listings_join_counterpart_from_both_sides() {
        let conn = open_memory_database().unwrap();
        let p = seed_patient(&conn, "Ada");
        let d1 = seed_doctor(&conn, "Grey");
        let d2 = seed_doctor(&conn, "House");
        insert_connection(&conn, &Connection::pending(p.id, d1.id, None)).unwrap();
        let mut connected = Connection::pending(p.id, d2.id, None);
        connected.status = ConnectionStatus::Connected;
        connected.connected_at = Some(Utc::now());
        insert_connection(&conn, &connected).unwrap();

        let all = list_patient_connections(&conn, &p.id, None).unwrap();
        assert_eq!(all.len(), 2);

        let only_connected =
            list_patient_connections(&conn, &p.id, Some(ConnectionStatus::Connected)).unwrap();
        assert_eq!(only_connected.len(), 1);
        assert_eq!(only_connected[0].counterpart_id, d2.id);
        assert_eq!(only_connected[0].name, "House");

        let from_doctor = list_doctor_connections(&conn, &d1.id, None).unwrap();
        assert_eq!(from_doctor.len(), 1);
        assert_eq!(from_doctor[0].counterpart_id, p.id);
        assert_eq!(from_doctor[0].status, ConnectionStatus::Pending);
    }
}
