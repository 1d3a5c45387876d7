//! API endpoint handlers.
//!
//! Each module corresponds to one resource under `/api/`.
//! Handlers translate JSON and multipart bodies into service calls.

pub mod auth;
pub mod connections;
pub mod health;
pub mod logs;
pub mod notes;
pub mod profile;
pub mod reports;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body returned by mutations that have nothing else to report.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// `?patientId=`: required for doctors, ignored for patients.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientQuery {
    pub patient_id: Option<Uuid>,
}
