use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "CareConnect";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:5173";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 720;

/// Password reset links stay valid this long.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;
/// Files accepted by one report upload.
pub const MAX_UPLOAD_FILES: usize = 5;
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

const DB_FILE_NAME: &str = "careconnect.db";
const UPLOADS_DIR_NAME: &str = "uploads";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Cannot determine a data directory; set CARECONNECT_DATA_DIR")]
    NoDataDir,
}

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "careconnect=info,careconnect_lib=info,audit=info,tower_http=warn"
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Frontend origin: used for reset links and CORS.
    pub public_url: String,
    pub session_ttl: Duration,
}

impl AppConfig {
    /// Read `CARECONNECT_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup("CARECONNECT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            key: "CARECONNECT_BIND",
            value: bind.clone(),
        })?;

        let data_dir = match lookup("CARECONNECT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join(APP_NAME),
        };

        let public_url = lookup("CARECONNECT_PUBLIC_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let session_ttl = match lookup("CARECONNECT_SESSION_TTL_HOURS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(hours) if hours > 0 => Duration::hours(hours),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "CARECONNECT_SESSION_TTL_HOURS",
                        value: raw,
                    })
                }
            },
            None => Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        };

        Ok(Self {
            bind_addr,
            data_dir,
            public_url,
            session_ttl,
        })
    }

    /// Settings rooted at `data_dir`, everything else default. Used by tests.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            data_dir: data_dir.into(),
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join(UPLOADS_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[("CARECONNECT_DATA_DIR", "/tmp/cc")])).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND);
        assert_eq!(config.public_url, DEFAULT_PUBLIC_URL);
        assert_eq!(config.session_ttl, Duration::hours(720));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/cc/careconnect.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/cc/uploads"));
    }

    #[test]
    fn overrides_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CARECONNECT_DATA_DIR", "/srv/cc"),
            ("CARECONNECT_BIND", "0.0.0.0:8080"),
            ("CARECONNECT_PUBLIC_URL", "https://care.example.org/"),
            ("CARECONNECT_SESSION_TTL_HOURS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.public_url, "https://care.example.org");
        assert_eq!(config.session_ttl, Duration::hours(12));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("CARECONNECT_DATA_DIR", "/tmp/cc"),
            ("CARECONNECT_BIND", "not-an-addr"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CARECONNECT_BIND", .. }));

        let err = AppConfig::from_lookup(lookup(&[
            ("CARECONNECT_DATA_DIR", "/tmp/cc"),
            ("CARECONNECT_SESSION_TTL_HOURS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
