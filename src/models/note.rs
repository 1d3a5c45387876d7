use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Consultation note written by a doctor about a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorNote {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub written_at: DateTime<Utc>,
    pub title: String,
    pub diagnosis: Option<String>,
    pub treatment_notes: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoctorNote {
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    pub diagnosis: Option<String>,
    pub treatment_notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
