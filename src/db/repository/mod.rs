//! Repository layer: entity-scoped database operations.
//!
//! Functions take a borrowed `rusqlite::Connection` and never decide
//! policy: authorization lives in `consent` and `records`.

mod connection;
mod health_log;
mod note;
mod report;
mod session;
mod user;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::DatabaseError;

// Re-export all public items from sub-modules
pub use connection::*;
pub use health_log::*;
pub use note::*;
pub use report::*;
pub use session::*;
pub use user::*;

/// Parse a hyphenated UUID stored as TEXT.
pub(crate) fn parse_uuid(value: &str, column: &'static str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::Corrupted {
        column,
        reason: e.to_string(),
    })
}

/// Encode a list or map column as JSON text.
pub(crate) fn to_json<T: Serialize>(value: &T, column: &'static str) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Corrupted {
        column,
        reason: e.to_string(),
    })
}

/// Decode a JSON text column.
pub(crate) fn from_json<T: DeserializeOwned>(
    value: &str,
    column: &'static str,
) -> Result<T, DatabaseError> {
    serde_json::from_str(value).map_err(|e| DatabaseError::Corrupted {
        column,
        reason: e.to_string(),
    })
}
