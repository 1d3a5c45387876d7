//! Doctor–patient consent graph.
//!
//! A connection is stored once, on the patient's side, keyed by
//! `(patient_id, doctor_id)`. It starts pending, becomes connected only by
//! patient approval, and ends only by removal. Capability flags are off
//! until the patient turns them on and count only while connected.

mod graph;

pub use graph::*;

use crate::db::DatabaseError;
use crate::models::Role;

#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("A connection request is already pending")]
    AlreadyPending,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Connection not found")]
    NotFound,
    #[error("Connection is not pending")]
    NotPending,
    #[error("Patient not found")]
    PatientNotFound,
    #[error("Invalid doctor")]
    InvalidDoctor,
    #[error("Only a {0} can do this")]
    RoleRequired(Role),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
