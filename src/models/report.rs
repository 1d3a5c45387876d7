use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded medical file (prescription, lab report, scan) with its
/// append-only revision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReport {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub uploaded_by: Uuid,
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub update_history: Vec<ReportRevision>,
}

impl MedicalReport {
    pub fn file_meta(&self) -> ReportFileMeta {
        ReportFileMeta {
            file_url: self.file_url.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// The file-level fields a revision snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFileMeta {
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub tags: Vec<String>,
}

/// Metadata as it was immediately before an update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRevision {
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    pub previous_data: ReportFileMeta,
}
