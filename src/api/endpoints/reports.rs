//! Medical report endpoints.
//!
//! - `POST /api/reports/upload`: multipart: `records` (1 to 5 files), `tags`
//!   (JSON array of tag lists, one per file), `patientId` (doctors only)
//! - `GET /api/reports/all?patientId=`
//! - `PUT /api/reports/update`: multipart: `record`, `reportId`, `tags`
//!   (JSON tag list), `patientId` (doctors only)
//! - `DELETE /api/reports/delete`: patient only

use axum::extract::multipart::Field;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::{MessageResponse, PatientQuery};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::mailer::{EmailMessage, Mailer};
use crate::models::MedicalReport;
use crate::records::reports::{self, UploadedFile};
use crate::storage::guess_content_type;

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub message: &'static str,
    pub reports: Vec<MedicalReport>,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub message: &'static str,
    pub report: MedicalReport,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeleteReportRequest {
    pub report_id: Option<Uuid>,
}

async fn read_file(field: Field<'_>) -> Result<UploadedFile, ApiError> {
    let file_name = field
        .file_name()
        .map(str::to_string)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Uploaded file has no name".into()))?;
    let content_type = field
        .content_type()
        .map(str::to_string)
        .filter(|ct| ct != "application/octet-stream")
        .unwrap_or_else(|| guess_content_type(&file_name));
    let bytes = field.bytes().await?;

    Ok(UploadedFile {
        file_name,
        content_type,
        bytes: bytes.to_vec(),
    })
}

async fn read_text(field: Field<'_>) -> Result<String, ApiError> {
    Ok(field.text().await?.trim().to_string())
}

fn parse_uuid_field(name: &str, value: &str) -> Result<Option<Uuid>, ApiError> {
    if value.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(value)
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("{name} is not a valid id")))
}

fn parse_json_field<T: DeserializeOwned>(name: &str, value: &str) -> Result<Option<T>, ApiError> {
    if value.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(value)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("{name} must be JSON: {e}")))
}

/// Send the doctor-upload notification off the request path. Failures are
/// logged; the reports are already committed.
fn notify(ctx: &ApiContext, email: EmailMessage) {
    let mailer = ctx.core.mailer.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = Mailer::send(mailer.as_ref(), &email) {
            tracing::warn!(to = %email.to, "Report notification failed: {e}");
        }
    });
}

/// `POST /api/reports/upload`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ReportsResponse>), ApiError> {
    let mut uploads: Vec<UploadedFile> = Vec::new();
    let mut tags: Vec<Vec<String>> = Vec::new();
    let mut patient_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "records" => uploads.push(read_file(field).await?),
            "tags" => {
                let text = read_text(field).await?;
                tags = parse_json_field("tags", &text)?.unwrap_or_default();
            }
            "patientId" => {
                let text = read_text(field).await?;
                patient_id = parse_uuid_field("patientId", &text)?;
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
            }
        }
    }

    let principal = auth.principal();
    let conn = ctx.core.open_db()?;
    let uploaded = reports::upload_reports(
        &conn,
        ctx.core.files.as_ref(),
        &principal,
        patient_id,
        uploads,
        tags,
    )?;

    match reports::upload_notification(&conn, &principal, &uploaded) {
        Ok(Some(email)) => notify(&ctx, email),
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not prepare report notification: {e}"),
    }

    Ok((
        StatusCode::CREATED,
        Json(ReportsResponse {
            message: "Reports uploaded",
            reports: uploaded,
        }),
    ))
}

/// `GET /api/reports/all?patientId=`
pub async fn all(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> Result<Json<Vec<MedicalReport>>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let list = reports::list_reports(&conn, &auth.principal(), query.patient_id)?;
    Ok(Json(list))
}

/// `PUT /api/reports/update`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<Json<ReportResponse>, ApiError> {
    let mut upload: Option<UploadedFile> = None;
    let mut tags: Option<Vec<String>> = None;
    let mut report_id: Option<Uuid> = None;
    let mut patient_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "record" => {
                if upload.is_some() {
                    return Err(ApiError::BadRequest("Only one file can replace a report".into()));
                }
                upload = Some(read_file(field).await?);
            }
            "tags" => {
                let text = read_text(field).await?;
                tags = parse_json_field("tags", &text)?;
            }
            "reportId" => {
                let text = read_text(field).await?;
                report_id = parse_uuid_field("reportId", &text)?;
            }
            "patientId" => {
                let text = read_text(field).await?;
                patient_id = parse_uuid_field("patientId", &text)?;
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown update field");
            }
        }
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("A replacement file is required".into()))?;
    let report_id = report_id.ok_or_else(|| ApiError::BadRequest("reportId is required".into()))?;

    let conn = ctx.core.open_db()?;
    let report = reports::update_report(
        &conn,
        ctx.core.files.as_ref(),
        &auth.principal(),
        patient_id,
        &report_id,
        upload,
        tags,
    )?;

    Ok(Json(ReportResponse {
        message: "Report updated",
        report,
    }))
}

/// `DELETE /api/reports/delete`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<DeleteReportRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    let report_id = request
        .report_id
        .ok_or_else(|| ApiError::BadRequest("reportId is required".into()))?;

    let conn = ctx.core.open_db()?;
    reports::delete_report(&conn, ctx.core.files.as_ref(), &auth.principal(), &report_id)?;

    Ok(Json(MessageResponse::new("Report deleted")))
}
