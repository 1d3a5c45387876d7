//! Resource gatekeepers: health logs, doctor notes and medical reports.
//!
//! Every read or write first resolves which patient it concerns, then asks
//! the consent graph whether the caller may touch that patient's data.

pub mod health_log;
pub mod notes;
pub mod reports;

use uuid::Uuid;

use crate::consent::ConsentError;
use crate::db::DatabaseError;
use crate::models::Principal;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Consent error: {0}")]
    Consent(#[from] ConsentError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The patient a request concerns. Patients always act on themselves;
/// doctors must name one.
pub fn resolve_subject(principal: &Principal, patient_id: Option<Uuid>) -> Result<Uuid, RecordError> {
    if principal.is_patient() {
        return Ok(principal.user_id);
    }
    patient_id.ok_or_else(|| RecordError::BadRequest("patientId is required".into()))
}

/// Trim tags, dropping blanks and repeats.
pub(crate) fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !cleaned.iter().any(|t| t == tag) {
            cleaned.push(tag.to_string());
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn patient_resolves_to_self_regardless_of_param() {
        let me = Principal {
            user_id: Uuid::new_v4(),
            role: Role::Patient,
        };
        assert_eq!(resolve_subject(&me, Some(Uuid::new_v4())).unwrap(), me.user_id);
        assert_eq!(resolve_subject(&me, None).unwrap(), me.user_id);
    }

    #[test]
    fn doctor_must_name_patient() {
        let doctor = Principal {
            user_id: Uuid::new_v4(),
            role: Role::Doctor,
        };
        let patient = Uuid::new_v4();
        assert_eq!(resolve_subject(&doctor, Some(patient)).unwrap(), patient);
        assert!(matches!(
            resolve_subject(&doctor, None),
            Err(RecordError::BadRequest(_))
        ));
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = clean_tags(vec![" lab ".into(), "lab".into(), "".into(), "x-ray".into()]);
        assert_eq!(tags, vec!["lab".to_string(), "x-ray".to_string()]);
    }
}
