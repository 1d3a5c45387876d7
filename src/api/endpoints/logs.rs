//! Health log endpoints.
//!
//! - `POST /api/logs/create`: patient records a daily update
//! - `GET /api/logs/all?patientId=`: patient's own logs, or a connected doctor's view
//! - `DELETE /api/logs/delete`: patient removes one of their logs

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::{MessageResponse, PatientQuery};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::models::{HealthLog, NewHealthLog};
use crate::records::health_log;

#[derive(Debug, Serialize)]
pub struct HealthLogResponse {
    pub message: &'static str,
    pub log: HealthLog,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteLogRequest {
    pub log_id: Option<Uuid>,
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<NewHealthLog>, JsonRejection>,
) -> Result<(StatusCode, Json<HealthLogResponse>), ApiError> {
    let Json(input) = body?;
    let conn = ctx.core.open_db()?;
    let log = health_log::create_health_log(&conn, &auth.principal(), input)?;

    Ok((
        StatusCode::CREATED,
        Json(HealthLogResponse {
            message: "Health log created",
            log,
        }),
    ))
}

pub async fn all(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> Result<Json<Vec<HealthLog>>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let logs = health_log::list_health_logs(&conn, &auth.principal(), query.patient_id)?;
    Ok(Json(logs))
}

pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<DeleteLogRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    let log_id = request
        .log_id
        .ok_or_else(|| ApiError::BadRequest("logId is required".into()))?;

    let conn = ctx.core.open_db()?;
    health_log::delete_health_log(&conn, &auth.principal(), &log_id)?;

    Ok(Json(MessageResponse::new("Health log deleted")))
}
