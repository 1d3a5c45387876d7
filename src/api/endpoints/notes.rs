//! Doctor note endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::endpoints::PatientQuery;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::models::{DoctorNote, NewDoctorNote};
use crate::records::notes;

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub message: &'static str,
    pub note: DoctorNote,
}

/// `POST /api/notes/create`: connected doctor writes about a patient.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<NewDoctorNote>, JsonRejection>,
) -> Result<(StatusCode, Json<NoteResponse>), ApiError> {
    let Json(input) = body?;
    let conn = ctx.core.open_db()?;
    let note = notes::create_note(&conn, &auth.principal(), input)?;

    Ok((
        StatusCode::CREATED,
        Json(NoteResponse {
            message: "Note created",
            note,
        }),
    ))
}

/// `GET /api/notes/all?patientId=`
pub async fn all(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> Result<Json<Vec<DoctorNote>>, ApiError> {
    let Query(query) = query?;
    let conn = ctx.core.open_db()?;
    let notes = notes::list_notes(&conn, &auth.principal(), query.patient_id)?;
    Ok(Json(notes))
}
