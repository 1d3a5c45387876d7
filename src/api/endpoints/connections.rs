//! Consent endpoints.
//!
//! Doctors request, patients approve and grant capabilities, either side
//! may disconnect. All routes are protected; role checks live in `consent`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::MessageResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::consent::{self, Approval, PatientRef};
use crate::models::{CapabilityPatch, Connection, ConnectionStatus, ConnectionView, Role};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub email: Option<String>,
    pub patient_id: Option<Uuid>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    #[serde(default)]
    pub approval_status: bool,
    #[serde(flatten)]
    pub grants: CapabilityPatch,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessUpdateRequest {
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    #[serde(flatten)]
    pub patch: CapabilityPatch,
}

/// `{doctorId}` from a patient, `{patientId}` from a doctor.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CounterpartyRequest {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub message: &'static str,
    pub connection: Connection,
}

/// Approval answer; `connection` is absent when the request was rejected.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<Connection>,
}

/// `POST /api/connections/request`: doctor only.
pub async fn request(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<ConnectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ConnectionResponse>), ApiError> {
    let Json(request) = body?;
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    let patient = match (email, request.patient_id) {
        (Some(email), _) => PatientRef::Email(email),
        (None, Some(id)) => PatientRef::Id(id),
        (None, None) => {
            return Err(ApiError::BadRequest("Please enter the patient's email".into()))
        }
    };

    let conn = ctx.core.open_db()?;
    let connection =
        consent::request_connection(&conn, &auth.principal(), patient, request.message)?;

    Ok((
        StatusCode::CREATED,
        Json(ConnectionResponse {
            message: "Connection request sent",
            connection,
        }),
    ))
}

/// `POST /api/connections/approve`: patient only.
pub async fn approve(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<ApprovalRequest>, JsonRejection>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let Json(request) = body?;
    let doctor_id = request
        .doctor_id
        .ok_or_else(|| ApiError::BadRequest("doctorId is required".into()))?;

    let conn = ctx.core.open_db()?;
    let outcome = consent::approve(
        &conn,
        &auth.principal(),
        &doctor_id,
        request.approval_status,
        &request.grants,
    )?;

    Ok(Json(match outcome {
        Approval::Connected(connection) => ApprovalResponse {
            message: "Connection approved",
            connection: Some(connection),
        },
        Approval::Rejected => ApprovalResponse {
            message: "Request rejected",
            connection: None,
        },
    }))
}

/// `GET /api/connections/connected-doctors`: patient only.
pub async fn connected_doctors(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    list_for_role(&ctx, &auth, Role::Patient, ConnectionStatus::Connected)
}

/// `GET /api/connections/connected-patients`: doctor only.
pub async fn connected_patients(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    list_for_role(&ctx, &auth, Role::Doctor, ConnectionStatus::Connected)
}

/// `GET /api/connections/pending`: incoming requests for a patient,
/// outgoing requests for a doctor.
pub async fn pending(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    list_for_role(&ctx, &auth, auth.user.role, ConnectionStatus::Pending)
}

fn list_for_role(
    ctx: &ApiContext,
    auth: &AuthContext,
    role: Role,
    status: ConnectionStatus,
) -> Result<Json<Vec<ConnectionView>>, ApiError> {
    if auth.user.role != role {
        return Err(ApiError::Forbidden(format!(
            "Only {}s can list these connections",
            role.as_str()
        )));
    }
    let conn = ctx.core.open_db()?;
    let views = consent::list_connections(&conn, &auth.principal(), Some(status))?;
    Ok(Json(views))
}

/// `DELETE /api/connections/disconnect`: either side.
pub async fn disconnect(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<CounterpartyRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    let counterparty = match auth.user.role {
        Role::Patient => request
            .doctor_id
            .ok_or_else(|| ApiError::BadRequest("doctorId is required".into()))?,
        Role::Doctor => request
            .patient_id
            .ok_or_else(|| ApiError::BadRequest("patientId is required".into()))?,
    };

    let conn = ctx.core.open_db()?;
    consent::disconnect(&conn, &auth.principal(), &counterparty)?;

    Ok(Json(MessageResponse::new("Disconnected successfully")))
}

/// `DELETE /api/connections/cancel`: doctor withdraws a pending request.
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<CounterpartyRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    let patient_id = request
        .patient_id
        .ok_or_else(|| ApiError::BadRequest("patientId is required".into()))?;

    let conn = ctx.core.open_db()?;
    consent::cancel_pending_request(&conn, &auth.principal(), &patient_id)?;

    Ok(Json(MessageResponse::new("Request cancelled")))
}

/// `PATCH /api/connections/update-access`: patient only; absent flags are kept.
pub async fn update_access(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<AccessUpdateRequest>, JsonRejection>,
) -> Result<Json<ConnectionResponse>, ApiError> {
    let Json(request) = body?;
    let doctor_id = request
        .doctor_id
        .ok_or_else(|| ApiError::BadRequest("doctorId is required".into()))?;
    if request.patch.is_empty() {
        return Err(ApiError::BadRequest("No access flags to update".into()));
    }

    let conn = ctx.core.open_db()?;
    let connection =
        consent::update_capabilities(&conn, &auth.principal(), &doctor_id, &request.patch)?;

    Ok(Json(ConnectionResponse {
        message: "Access updated",
        connection,
    }))
}
