use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Capability, ConnectionStatus};

/// Consent relationship between one patient and one doctor.
///
/// Keyed by `(patient_id, doctor_id)`; owned by the patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: ConnectionStatus,
    pub request_message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub chat_enabled: bool,
    pub view_past_notes: bool,
    pub reports_access: bool,
    pub update_records: bool,
    pub view_health_logs: bool,
}

impl Connection {
    /// A fresh pending request: no connection time, every flag off.
    pub fn pending(patient_id: Uuid, doctor_id: Uuid, request_message: Option<String>) -> Self {
        Self {
            patient_id,
            doctor_id,
            status: ConnectionStatus::Pending,
            request_message,
            requested_at: Utc::now(),
            connected_at: None,
            pinned: false,
            chat_enabled: false,
            view_past_notes: false,
            reports_access: false,
            update_records: false,
            view_health_logs: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn flag(&self, capability: Capability) -> bool {
        match capability {
            Capability::ChatEnabled => self.chat_enabled,
            Capability::ViewPastNotes => self.view_past_notes,
            Capability::ReportsAccess => self.reports_access,
            Capability::UpdateRecords => self.update_records,
            Capability::ViewHealthLogs => self.view_health_logs,
        }
    }

    /// Assign only the flags present in `patch`.
    pub fn apply_patch(&mut self, patch: &CapabilityPatch) {
        if let Some(v) = patch.pinned {
            self.pinned = v;
        }
        if let Some(v) = patch.chat_enabled {
            self.chat_enabled = v;
        }
        if let Some(v) = patch.view_past_notes {
            self.view_past_notes = v;
        }
        if let Some(v) = patch.reports_access {
            self.reports_access = v;
        }
        if let Some(v) = patch.update_records {
            self.update_records = v;
        }
        if let Some(v) = patch.view_health_logs {
            self.view_health_logs = v;
        }
    }

    /// Overwrite every flag, treating absent fields as `false`.
    pub fn grant(&mut self, patch: &CapabilityPatch) {
        self.pinned = patch.pinned.unwrap_or(false);
        self.chat_enabled = patch.chat_enabled.unwrap_or(false);
        self.view_past_notes = patch.view_past_notes.unwrap_or(false);
        self.reports_access = patch.reports_access.unwrap_or(false);
        self.update_records = patch.update_records.unwrap_or(false);
        self.view_health_logs = patch.view_health_logs.unwrap_or(false);
    }
}

/// Partial flag update. `None` means "not mentioned", which is different
/// from `Some(false)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityPatch {
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub chat_enabled: Option<bool>,
    #[serde(default)]
    pub view_past_notes: Option<bool>,
    #[serde(default)]
    pub reports_access: Option<bool>,
    #[serde(default)]
    pub update_records: Option<bool>,
    #[serde(default)]
    pub view_health_logs: Option<bool>,
}

impl CapabilityPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One row of a connection listing, seen from the caller's side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    /// The other party: the doctor for a patient, the patient for a doctor.
    pub counterpart_id: Uuid,
    pub name: String,
    pub email: String,
    pub status: ConnectionStatus,
    pub request_message: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub chat_enabled: bool,
    pub view_past_notes: bool,
    pub reports_access: bool,
    pub update_records: bool,
    pub view_health_logs: bool,
}
