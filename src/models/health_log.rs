use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One daily health update recorded by a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthLog {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub logged_at: DateTime<Utc>,
    pub mood: Option<String>,
    pub blood_pressure: Option<String>,
    pub sugar_level: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHealthLog {
    pub mood: Option<String>,
    pub blood_pressure: Option<String>,
    pub sugar_level: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
