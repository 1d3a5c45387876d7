use chrono::Utc;
use rusqlite::Connection as SqlConnection;
use uuid::Uuid;

use super::ConsentError;
use crate::db::repository;
use crate::models::{
    Capability, CapabilityPatch, Connection, ConnectionStatus, ConnectionView, Principal, Role,
    User,
};

/// How a doctor names the patient they want to connect with.
#[derive(Debug, Clone, Copy)]
pub enum PatientRef<'a> {
    Email(&'a str),
    Id(Uuid),
}

/// Result of a patient answering a pending request.
#[derive(Debug, Clone)]
pub enum Approval {
    Connected(Connection),
    Rejected,
}

fn require_role(principal: &Principal, role: Role) -> Result<(), ConsentError> {
    if principal.role == role {
        Ok(())
    } else {
        Err(ConsentError::RoleRequired(role))
    }
}

fn find_patient(conn: &SqlConnection, patient: PatientRef<'_>) -> Result<User, ConsentError> {
    let user = match patient {
        PatientRef::Email(email) => repository::get_user_by_email(conn, email.trim())?,
        PatientRef::Id(id) => repository::get_user(conn, &id)?,
    };
    user.filter(|u| u.role == Role::Patient)
        .ok_or(ConsentError::PatientNotFound)
}

// ═══════════════════════════════════════════
// Mutations
// ═══════════════════════════════════════════

/// A doctor asks a patient for consent. Creates a pending connection.
pub fn request_connection(
    conn: &SqlConnection,
    doctor: &Principal,
    patient: PatientRef<'_>,
    message: Option<String>,
) -> Result<Connection, ConsentError> {
    require_role(doctor, Role::Doctor)?;
    let patient = find_patient(conn, patient)?;

    match repository::get_connection(conn, &patient.id, &doctor.user_id)? {
        Some(existing) if existing.is_connected() => return Err(ConsentError::AlreadyConnected),
        Some(_) => return Err(ConsentError::AlreadyPending),
        None => {}
    }

    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    let connection = Connection::pending(patient.id, doctor.user_id, message);

    // The composite key still rejects a request that raced past the check above.
    repository::insert_connection(conn, &connection).map_err(|e| {
        if e.is_unique_violation() {
            ConsentError::AlreadyPending
        } else {
            e.into()
        }
    })?;

    tracing::info!(
        patient_id = %patient.id,
        doctor_id = %doctor.user_id,
        "Connection requested"
    );
    Ok(connection)
}

/// A patient accepts or rejects a doctor's request.
///
/// Approval sets every capability from `grants`, absent ones to `false`.
/// Rejection removes the pending row and succeeds even if there was none.
pub fn approve(
    conn: &SqlConnection,
    patient: &Principal,
    doctor_id: &Uuid,
    approve: bool,
    grants: &CapabilityPatch,
) -> Result<Approval, ConsentError> {
    require_role(patient, Role::Patient)?;
    match repository::get_user(conn, doctor_id)? {
        Some(u) if u.role == Role::Doctor => {}
        _ => return Err(ConsentError::InvalidDoctor),
    }

    let existing = repository::get_connection(conn, &patient.user_id, doctor_id)?;
    if existing.as_ref().is_some_and(Connection::is_connected) {
        return Err(ConsentError::AlreadyConnected);
    }

    if !approve {
        repository::delete_connection(
            conn,
            &patient.user_id,
            doctor_id,
            Some(ConnectionStatus::Pending),
        )?;
        tracing::info!(
            patient_id = %patient.user_id,
            doctor_id = %doctor_id,
            "Connection request rejected"
        );
        return Ok(Approval::Rejected);
    }

    let mut connection = existing.ok_or(ConsentError::NotFound)?;
    connection.status = ConnectionStatus::Connected;
    connection.connected_at = Some(Utc::now());
    connection.grant(grants);
    repository::update_connection(conn, &connection)?;

    tracing::info!(
        patient_id = %patient.user_id,
        doctor_id = %doctor_id,
        "Connection approved"
    );
    Ok(Approval::Connected(connection))
}

/// The patient changes the flags named in `patch`; the rest are untouched.
///
/// Works on pending rows too. Flags there grant nothing until approval,
/// which resets every flag from its own grants.
pub fn update_capabilities(
    conn: &SqlConnection,
    patient: &Principal,
    doctor_id: &Uuid,
    patch: &CapabilityPatch,
) -> Result<Connection, ConsentError> {
    require_role(patient, Role::Patient)?;
    let mut connection = repository::get_connection(conn, &patient.user_id, doctor_id)?
        .ok_or(ConsentError::NotFound)?;

    connection.apply_patch(patch);
    repository::update_connection(conn, &connection)?;

    tracing::info!(
        patient_id = %patient.user_id,
        doctor_id = %doctor_id,
        "Connection access updated"
    );
    Ok(connection)
}

/// Either party ends the relationship, whatever its status.
pub fn disconnect(
    conn: &SqlConnection,
    initiator: &Principal,
    counterparty_id: &Uuid,
) -> Result<(), ConsentError> {
    let (patient_id, doctor_id) = match initiator.role {
        Role::Patient => (initiator.user_id, *counterparty_id),
        Role::Doctor => (*counterparty_id, initiator.user_id),
    };

    let removed = repository::delete_connection(conn, &patient_id, &doctor_id, None)?;
    if removed == 0 {
        return Err(ConsentError::NotFound);
    }

    tracing::info!(
        patient_id = %patient_id,
        doctor_id = %doctor_id,
        initiator = %initiator.role,
        "Connection removed"
    );
    Ok(())
}

/// A doctor withdraws a request the patient has not answered yet.
/// A connected row is left intact.
pub fn cancel_pending_request(
    conn: &SqlConnection,
    doctor: &Principal,
    patient_id: &Uuid,
) -> Result<(), ConsentError> {
    require_role(doctor, Role::Doctor)?;
    let patient = find_patient(conn, PatientRef::Id(*patient_id))?;

    let removed = repository::delete_connection(
        conn,
        &patient.id,
        &doctor.user_id,
        Some(ConnectionStatus::Pending),
    )?;
    if removed == 0 {
        return match repository::get_connection(conn, &patient.id, &doctor.user_id)? {
            Some(_) => Err(ConsentError::NotPending),
            None => Err(ConsentError::NotFound),
        };
    }

    tracing::info!(
        patient_id = %patient.id,
        doctor_id = %doctor.user_id,
        "Connection request cancelled"
    );
    Ok(())
}

// ═══════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════

/// True only when the pair is connected AND the flag is on.
pub fn has_capability(
    conn: &SqlConnection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
    capability: Capability,
) -> Result<bool, ConsentError> {
    Ok(repository::get_connection(conn, patient_id, doctor_id)?
        .is_some_and(|c| c.is_connected() && c.flag(capability)))
}

pub fn is_connected(
    conn: &SqlConnection,
    patient_id: &Uuid,
    doctor_id: &Uuid,
) -> Result<bool, ConsentError> {
    Ok(repository::get_connection(conn, patient_id, doctor_id)?
        .is_some_and(|c| c.is_connected()))
}

/// Connections seen from the caller's side, optionally narrowed by status.
pub fn list_connections(
    conn: &SqlConnection,
    principal: &Principal,
    status: Option<ConnectionStatus>,
) -> Result<Vec<ConnectionView>, ConsentError> {
    let views = match principal.role {
        Role::Patient => repository::list_patient_connections(conn, &principal.user_id, status)?,
        Role::Doctor => repository::list_doctor_connections(conn, &principal.user_id, status)?,
    };
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{seed_doctor, seed_patient};
    use crate::db::sqlite::open_memory_database;

    struct Pair {
        conn: SqlConnection,
        patient: Principal,
        doctor: Principal,
    }

    fn pair() -> Pair {
        let conn = open_memory_database().unwrap();
        let patient = seed_patient(&conn, "Ada").principal();
        let doctor = seed_doctor(&conn, "Grey").principal();
        Pair {
            conn,
            patient,
            doctor,
        }
    }

    fn connect(p: &Pair, grants: CapabilityPatch) -> Connection {
        request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None).unwrap();
        match approve(&p.conn, &p.patient, &p.doctor.user_id, true, &grants).unwrap() {
            Approval::Connected(c) => c,
            Approval::Rejected => panic!("expected a connection"),
        }
    }

    #[test]
    fn request_creates_pending_row() {
        let p = pair();
        let c = request_connection(
            &p.conn,
            &p.doctor,
            PatientRef::Email("ADA@example.org"),
            Some("  Please share your labs ".into()),
        )
        .unwrap();

        assert_eq!(c.status, ConnectionStatus::Pending);
        assert_eq!(c.request_message.as_deref(), Some("Please share your labs"));
        assert!(c.connected_at.is_none());
    }

    #[test]
    fn second_request_conflicts_by_status() {
        let p = pair();
        request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None).unwrap();
        let err = request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None)
            .unwrap_err();
        assert!(matches!(err, ConsentError::AlreadyPending));

        approve(&p.conn, &p.patient, &p.doctor.user_id, true, &CapabilityPatch::default()).unwrap();
        let err = request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None)
            .unwrap_err();
        assert!(matches!(err, ConsentError::AlreadyConnected));
        assert_eq!(repository::count_patient_connections(&p.conn, &p.patient.user_id).unwrap(), 1);
    }

    #[test]
    fn request_to_doctor_or_unknown_is_patient_not_found() {
        let p = pair();
        let other_doctor = seed_doctor(&p.conn, "House");
        let err = request_connection(&p.conn, &p.doctor, PatientRef::Id(other_doctor.id), None)
            .unwrap_err();
        assert!(matches!(err, ConsentError::PatientNotFound));

        let err = request_connection(&p.conn, &p.doctor, PatientRef::Email("nobody@example.org"), None)
            .unwrap_err();
        assert!(matches!(err, ConsentError::PatientNotFound));
    }

    #[test]
    fn patient_cannot_send_requests() {
        let p = pair();
        let err = request_connection(&p.conn, &p.patient, PatientRef::Id(p.patient.user_id), None)
            .unwrap_err();
        assert!(matches!(err, ConsentError::RoleRequired(Role::Doctor)));
    }

    #[test]
    fn approval_grants_only_named_flags() {
        let p = pair();
        let c = connect(
            &p,
            CapabilityPatch {
                chat_enabled: Some(true),
                ..Default::default()
            },
        );
        assert!(c.is_connected());
        assert!(c.connected_at.is_some());
        assert!(c.chat_enabled);
        assert!(!c.view_past_notes);

        let id = (&p.patient.user_id, &p.doctor.user_id);
        assert!(has_capability(&p.conn, id.0, id.1, Capability::ChatEnabled).unwrap());
        assert!(!has_capability(&p.conn, id.0, id.1, Capability::ReportsAccess).unwrap());
        assert!(is_connected(&p.conn, id.0, id.1).unwrap());
    }

    #[test]
    fn approval_is_one_way() {
        let p = pair();
        connect(&p, CapabilityPatch::default());
        let err = approve(&p.conn, &p.patient, &p.doctor.user_id, true, &CapabilityPatch::default())
            .unwrap_err();
        assert!(matches!(err, ConsentError::AlreadyConnected));
        let err = approve(&p.conn, &p.patient, &p.doctor.user_id, false, &CapabilityPatch::default())
            .unwrap_err();
        assert!(matches!(err, ConsentError::AlreadyConnected));
    }

    #[test]
    fn approve_without_request_is_not_found() {
        let p = pair();
        let err = approve(&p.conn, &p.patient, &p.doctor.user_id, true, &CapabilityPatch::default())
            .unwrap_err();
        assert!(matches!(err, ConsentError::NotFound));
    }

    #[test]
    fn rejection_removes_pending_and_tolerates_absence() {
        let p = pair();
        request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None).unwrap();
        let outcome =
            approve(&p.conn, &p.patient, &p.doctor.user_id, false, &CapabilityPatch::default()).unwrap();
        assert!(matches!(outcome, Approval::Rejected));
        assert_eq!(repository::count_patient_connections(&p.conn, &p.patient.user_id).unwrap(), 0);

        let again =
            approve(&p.conn, &p.patient, &p.doctor.user_id, false, &CapabilityPatch::default()).unwrap();
        assert!(matches!(again, Approval::Rejected));
    }

    #[test]
    fn approving_a_non_doctor_is_invalid() {
        let p = pair();
        let other_patient = seed_patient(&p.conn, "Bob");
        let err = approve(&p.conn, &p.patient, &other_patient.id, true, &CapabilityPatch::default())
            .unwrap_err();
        assert!(matches!(err, ConsentError::InvalidDoctor));
    }

    #[test]
    fn capability_patch_is_partial() {
        let p = pair();
        connect(
            &p,
            CapabilityPatch {
                reports_access: Some(true),
                ..Default::default()
            },
        );

        let c = update_capabilities(
            &p.conn,
            &p.patient,
            &p.doctor.user_id,
            &CapabilityPatch {
                pinned: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(c.pinned);
        assert!(c.reports_access);

        let c = update_capabilities(
            &p.conn,
            &p.patient,
            &p.doctor.user_id,
            &CapabilityPatch {
                reports_access: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!c.reports_access);
        assert!(c.pinned);
    }

    #[test]
    fn patch_on_pending_row_is_stored_but_grants_nothing() {
        let p = pair();
        request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None).unwrap();
        let patch = CapabilityPatch {
            pinned: Some(true),
            view_health_logs: Some(true),
            ..Default::default()
        };
        let c = update_capabilities(&p.conn, &p.patient, &p.doctor.user_id, &patch).unwrap();
        assert_eq!(c.status, ConnectionStatus::Pending);
        assert!(c.pinned);
        assert!(c.view_health_logs);
        assert!(!has_capability(
            &p.conn,
            &p.patient.user_id,
            &p.doctor.user_id,
            Capability::ViewHealthLogs
        )
        .unwrap());

        let grants = CapabilityPatch {
            chat_enabled: Some(true),
            ..Default::default()
        };
        let c = match approve(&p.conn, &p.patient, &p.doctor.user_id, true, &grants).unwrap() {
            Approval::Connected(c) => c,
            Approval::Rejected => panic!("expected a connection"),
        };
        assert!(c.chat_enabled);
        assert!(!c.pinned);
        assert!(!c.view_health_logs);

        let err = update_capabilities(&p.conn, &p.patient, &Uuid::new_v4(), &patch).unwrap_err();
        assert!(matches!(err, ConsentError::NotFound));
    }

    #[test]
    fn disconnect_twice_reports_not_found() {
        let p = pair();
        connect(&p, CapabilityPatch::default());
        disconnect(&p.conn, &p.patient, &p.doctor.user_id).unwrap();
        let err = disconnect(&p.conn, &p.patient, &p.doctor.user_id).unwrap_err();
        assert!(matches!(err, ConsentError::NotFound));
        assert!(!is_connected(&p.conn, &p.patient.user_id, &p.doctor.user_id).unwrap());
    }

    #[test]
    fn doctor_can_disconnect_pending_row() {
        let p = pair();
        request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None).unwrap();
        disconnect(&p.conn, &p.doctor, &p.patient.user_id).unwrap();
        assert_eq!(repository::count_patient_connections(&p.conn, &p.patient.user_id).unwrap(), 0);
    }

    #[test]
    fn cancel_leaves_connected_row_intact() {
        let p = pair();
        connect(&p, CapabilityPatch::default());
        let err = cancel_pending_request(&p.conn, &p.doctor, &p.patient.user_id).unwrap_err();
        assert!(matches!(err, ConsentError::NotPending));
        assert!(is_connected(&p.conn, &p.patient.user_id, &p.doctor.user_id).unwrap());
    }

    #[test]
    fn cancel_removes_pending_then_reports_not_found() {
        let p = pair();
        request_connection(&p.conn, &p.doctor, PatientRef::Id(p.patient.user_id), None).unwrap();
        cancel_pending_request(&p.conn, &p.doctor, &p.patient.user_id).unwrap();
        let err = cancel_pending_request(&p.conn, &p.doctor, &p.patient.user_id).unwrap_err();
        assert!(matches!(err, ConsentError::NotFound));

        let err = cancel_pending_request(&p.conn, &p.doctor, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ConsentError::PatientNotFound));
    }

    #[test]
    fn listings_follow_caller_role() {
        let p = pair();
        connect(&p, CapabilityPatch::default());
        let other = seed_doctor(&p.conn, "House").principal();
        request_connection(&p.conn, &other, PatientRef::Id(p.patient.user_id), None).unwrap();

        let doctors = list_connections(&p.conn, &p.patient, Some(ConnectionStatus::Connected)).unwrap();
        assert_eq!(doctors.len(), 1);
        assert_eq!(doctors[0].counterpart_id, p.doctor.user_id);

        let pending = list_connections(&p.conn, &p.patient, Some(ConnectionStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "House");

        let patients = list_connections(&p.conn, &other, None).unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].counterpart_id, p.patient.user_id);
        assert_eq!(patients[0].email, "ada@example.org");
    }
}
