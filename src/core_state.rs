//! Process-wide state shared by every request.
//!
//! Holds configuration and the two side channels. The database is not
//! held open: each request opens its own connection via [`CoreState::open_db`].

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::{self, DatabaseError};
use crate::mailer::{LogMailer, Mailer};
use crate::storage::{DiskFileStore, FileStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct CoreState {
    pub config: AppConfig,
    pub files: Arc<dyn FileStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl CoreState {
    /// Create directories, apply migrations and drop expired sessions.
    /// Files go to disk and mail to the log.
    pub fn initialize(config: AppConfig) -> Result<Self, CoreError> {
        let files = Arc::new(DiskFileStore::new(config.uploads_dir())?);
        Self::with_services(config, files, Arc::new(LogMailer))
    }

    pub fn with_services(
        config: AppConfig,
        files: Arc<dyn FileStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir)?;

        let conn = db::open_database(&config.db_path())?;
        let purged = db::purge_expired_sessions(&conn)?;
        tracing::info!(
            db = %config.db_path().display(),
            expired_sessions = purged,
            "Database ready"
        );

        Ok(Self {
            config,
            files,
            mailer,
        })
    }

    /// Open a connection for one request. Migrations already ran.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        Ok(db::connect(&self.config.db_path())?)
    }
}
