//! Accounts, bearer sessions and password resets.

use std::sync::LazyLock;

use chrono::{Duration, Utc};
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::RESET_TOKEN_TTL_MINUTES;
use crate::consent::{self, ConsentError};
use crate::crypto::{generate_token, hash_password, hash_token, verify_password, CryptoError};
use crate::db::{repository, DatabaseError};
use crate::mailer::{password_reset_email, MailError, Mailer};
use crate::models::{ConnectionView, NewUser, Principal, ProfileUpdate, Role, User};

pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0}")]
    Validation(String),
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid or expired reset token")]
    InvalidResetToken,
    #[error("Session expired or invalid")]
    InvalidSession,
    #[error("Stored password hash is unreadable")]
    Crypto(#[from] CryptoError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

impl From<ConsentError> for IdentityError {
    fn from(err: ConsentError) -> Self {
        match err {
            ConsentError::Database(e) => Self::Database(e),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// A user together with a freshly issued bearer token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// A user's own profile; patients also see their connections.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connections: Option<Vec<ConnectionView>>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), IdentityError> {
    if EMAIL_PATTERN.is_match(email) {
        Ok(())
    } else {
        Err(IdentityError::Validation("Invalid email address".into()))
    }
}

fn validate_password(password: &str) -> Result<(), IdentityError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn issue_session(conn: &Connection, user: User, ttl: Duration) -> Result<AuthSession, IdentityError> {
    let token = generate_token();
    repository::insert_session(conn, &hash_token(&token), &user.id, Utc::now() + ttl)?;
    Ok(AuthSession { user, token })
}

// ═══════════════════════════════════════════
// Registration & login
// ═══════════════════════════════════════════

pub fn register(conn: &Connection, input: NewUser, ttl: Duration) -> Result<AuthSession, IdentityError> {
    let name = input.name.trim().to_string();
    let email = normalize_email(&input.email);
    let Some(role) = input.role else {
        return Err(IdentityError::Validation("Role is required".into()));
    };
    if name.is_empty() || email.is_empty() || input.password.is_empty() {
        return Err(IdentityError::Validation(
            "Name, email and password are required".into(),
        ));
    }
    validate_email(&email)?;
    validate_password(&input.password)?;

    if repository::email_exists(conn, &email)? {
        return Err(IdentityError::EmailTaken);
    }

    let now = Utc::now();
    let (specialization, age, gender) = match role {
        Role::Doctor => (non_blank(input.specialization), None, None),
        Role::Patient => (None, input.age, non_blank(input.gender)),
    };
    let user = User {
        id: Uuid::new_v4(),
        name,
        email,
        password_hash: hash_password(&input.password),
        role,
        specialization,
        age,
        gender,
        custom_fields: vec![],
        last_seen: Some(now),
        created_at: now,
        updated_at: now,
    };
    repository::insert_user(conn, &user).map_err(|e| {
        if e.is_unique_violation() {
            IdentityError::EmailTaken
        } else {
            e.into()
        }
    })?;

    tracing::info!(user_id = %user.id, role = %user.role, "User registered");
    issue_session(conn, user, ttl)
}

pub fn login(
    conn: &Connection,
    email: &str,
    password: &str,
    ttl: Duration,
) -> Result<AuthSession, IdentityError> {
    let user = repository::get_user_by_email(conn, &normalize_email(email))?
        .ok_or(IdentityError::UserNotFound)?;

    match verify_password(password, &user.password_hash) {
        Ok(()) => {}
        Err(CryptoError::WrongPassword) => return Err(IdentityError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    }

    repository::touch_last_seen(conn, &user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");
    issue_session(conn, user, ttl)
}

pub fn check_email(conn: &Connection, email: &str) -> Result<bool, IdentityError> {
    Ok(repository::email_exists(conn, &normalize_email(email))?)
}

pub fn logout(conn: &Connection, token: &str) -> Result<(), IdentityError> {
    if !repository::delete_session(conn, &hash_token(token))? {
        return Err(IdentityError::InvalidSession);
    }
    Ok(())
}

/// Resolve a bearer token to its user and record the activity.
pub fn authenticate(conn: &Connection, token: &str) -> Result<User, IdentityError> {
    let user_id = repository::find_session_user(conn, &hash_token(token))?
        .ok_or(IdentityError::InvalidSession)?;
    let user = repository::get_user(conn, &user_id)?.ok_or(IdentityError::InvalidSession)?;
    repository::touch_last_seen(conn, &user.id)?;
    Ok(user)
}

// ═══════════════════════════════════════════
// Password reset
// ═══════════════════════════════════════════

/// Issue a single-use reset token and email the link to the user.
pub fn forgot_password(
    conn: &Connection,
    mailer: &dyn Mailer,
    email: &str,
    public_url: &str,
) -> Result<(), IdentityError> {
    let user = repository::get_user_by_email(conn, &normalize_email(email))?
        .ok_or(IdentityError::UserNotFound)?;

    let token = generate_token();
    let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);
    repository::set_reset_token(conn, &user.id, &hash_token(&token), expires_at)?;

    let link = format!("{public_url}/reset-password/{token}/{}", user.id);
    mailer.send(&password_reset_email(&user.email, &user.name, &link))?;

    tracing::info!(user_id = %user.id, "Password reset requested");
    Ok(())
}

/// Consume a reset token. All of the user's sessions are revoked.
pub fn reset_password(
    conn: &Connection,
    user_id: &Uuid,
    token: &str,
    new_password: &str,
) -> Result<(), IdentityError> {
    validate_password(new_password)?;

    let (stored_hash, expires_at) =
        repository::get_reset_token(conn, user_id)?.ok_or(IdentityError::InvalidResetToken)?;
    let presented = hash_token(token);
    let matches = bool::from(presented[..].ct_eq(&stored_hash[..]));
    if !matches || expires_at <= Utc::now() {
        return Err(IdentityError::InvalidResetToken);
    }

    repository::set_password_hash(conn, user_id, &hash_password(new_password))?;
    repository::clear_reset_token(conn, user_id)?;
    let revoked = repository::delete_sessions_for_user(conn, user_id)?;

    tracing::info!(user_id = %user_id, sessions_revoked = revoked, "Password reset");
    Ok(())
}

// ═══════════════════════════════════════════
// Profile
// ═══════════════════════════════════════════

pub fn view_profile(conn: &Connection, principal: &Principal) -> Result<Profile, IdentityError> {
    let user = repository::get_user(conn, &principal.user_id)?.ok_or(IdentityError::UserNotFound)?;
    let connections = if principal.is_patient() {
        Some(consent::list_connections(conn, principal, None)?)
    } else {
        None
    };
    Ok(Profile { user, connections })
}

/// Partial update; role-specific fields of the other role are ignored.
pub fn update_profile(
    conn: &Connection,
    principal: &Principal,
    update: ProfileUpdate,
) -> Result<User, IdentityError> {
    let mut update = ProfileUpdate {
        name: update.name.map(|n| n.trim().to_string()),
        specialization: non_blank(update.specialization),
        age: update.age,
        gender: non_blank(update.gender),
        custom_fields: update.custom_fields.map(|fields| {
            let mut cleaned: Vec<String> = Vec::new();
            for field in fields.into_iter().map(|f| f.trim().to_string()) {
                if !field.is_empty() && !cleaned.contains(&field) {
                    cleaned.push(field);
                }
            }
            cleaned
        }),
    };
    if update.name.as_deref() == Some("") {
        return Err(IdentityError::Validation("Name cannot be empty".into()));
    }
    match principal.role {
        Role::Doctor => {
            update.age = None;
            update.gender = None;
            update.custom_fields = None;
        }
        Role::Patient => update.specialization = None,
    }

    if !repository::update_user_profile(conn, &principal.user_id, &update)? {
        return Err(IdentityError::UserNotFound);
    }
    repository::get_user(conn, &principal.user_id)?.ok_or(IdentityError::UserNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::mailer::MemoryMailer;

    fn ttl() -> Duration {
        Duration::hours(1)
    }

    fn new_user(name: &str, email: &str, role: Role) -> NewUser {
        NewUser {
            name: name.into(),
            email: email.into(),
            password: "s3cret-pass".into(),
            role: Some(role),
            specialization: Some("Cardiology".into()),
            age: Some(34),
            gender: Some("female".into()),
        }
    }

    #[test]
    fn register_normalizes_and_issues_token() {
        let conn = open_memory_database().unwrap();
        let session =
            register(&conn, new_user(" Ada ", " Ada@Example.ORG ", Role::Patient), ttl()).unwrap();

        assert_eq!(session.user.name, "Ada");
        assert_eq!(session.user.email, "ada@example.org");
        assert_eq!(session.user.age, Some(34));
        assert!(session.user.specialization.is_none());
        assert_eq!(authenticate(&conn, &session.token).unwrap().id, session.user.id);
    }

    #[test]
    fn register_rejects_bad_input() {
        let conn = open_memory_database().unwrap();
        let mut missing_role = new_user("Ada", "ada@example.org", Role::Patient);
        missing_role.role = None;
        let mut short = new_user("Ada", "ada@example.org", Role::Patient);
        short.password = "short".into();

        for input in [
            missing_role,
            short,
            new_user("", "ada@example.org", Role::Patient),
            new_user("Ada", "not-an-email", Role::Patient),
        ] {
            assert!(matches!(
                register(&conn, input, ttl()),
                Err(IdentityError::Validation(_))
            ));
        }
    }

    #[test]
    fn duplicate_email_is_taken() {
        let conn = open_memory_database().unwrap();
        register(&conn, new_user("Ada", "ada@example.org", Role::Patient), ttl()).unwrap();
        let err = register(&conn, new_user("Ada 2", "ADA@example.org", Role::Doctor), ttl())
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailTaken));
        assert!(check_email(&conn, "ada@EXAMPLE.org").unwrap());
    }

    #[test]
    fn login_distinguishes_unknown_user_and_wrong_password() {
        let conn = open_memory_database().unwrap();
        register(&conn, new_user("Grey", "grey@example.org", Role::Doctor), ttl()).unwrap();

        assert!(login(&conn, "grey@example.org", "s3cret-pass", ttl()).is_ok());
        assert!(matches!(
            login(&conn, "grey@example.org", "wrong-pass", ttl()),
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            login(&conn, "nobody@example.org", "s3cret-pass", ttl()),
            Err(IdentityError::UserNotFound)
        ));
    }

    #[test]
    fn logout_revokes_token() {
        let conn = open_memory_database().unwrap();
        let session = register(&conn, new_user("Ada", "ada@example.org", Role::Patient), ttl()).unwrap();
        logout(&conn, &session.token).unwrap();
        assert!(matches!(
            authenticate(&conn, &session.token),
            Err(IdentityError::InvalidSession)
        ));
    }

    fn token_from_link(body: &str) -> (String, Uuid) {
        let link = body
            .split_whitespace()
            .find(|w| w.contains("/reset-password/"))
            .unwrap();
        let mut parts = link.rsplit('/');
        let id = parts.next().unwrap().parse().unwrap();
        let token = parts.next().unwrap().to_string();
        (token, id)
    }

    #[test]
    fn reset_flow_is_single_use_and_revokes_sessions() {
        let conn = open_memory_database().unwrap();
        let mailer = MemoryMailer::new();
        let session = register(&conn, new_user("Ada", "ada@example.org", Role::Patient), ttl()).unwrap();

        forgot_password(&conn, &mailer, "ada@example.org", "http://localhost:5173").unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("http://localhost:5173/reset-password/"));
        let (token, user_id) = token_from_link(&sent[0].body);
        assert_eq!(user_id, session.user.id);

        assert!(matches!(
            reset_password(&conn, &user_id, "forged", "new-password-1"),
            Err(IdentityError::InvalidResetToken)
        ));
        reset_password(&conn, &user_id, &token, "new-password-1").unwrap();

        assert!(authenticate(&conn, &session.token).is_err());
        assert!(login(&conn, "ada@example.org", "new-password-1", ttl()).is_ok());
        assert!(matches!(
            reset_password(&conn, &user_id, &token, "another-pass-2"),
            Err(IdentityError::InvalidResetToken)
        ));
    }

    #[test]
    fn expired_reset_token_is_rejected() {
        let conn = open_memory_database().unwrap();
        let session = register(&conn, new_user("Ada", "ada@example.org", Role::Patient), ttl()).unwrap();
        let token = "expired-token";
        repository::set_reset_token(
            &conn,
            &session.user.id,
            &hash_token(token),
            Utc::now() - Duration::minutes(1),
        )
        .unwrap();
        assert!(matches!(
            reset_password(&conn, &session.user.id, token, "new-password-1"),
            Err(IdentityError::InvalidResetToken)
        ));
    }

    #[test]
    fn forgot_password_for_unknown_email_is_not_found() {
        let conn = open_memory_database().unwrap();
        let mailer = MemoryMailer::new();
        assert!(matches!(
            forgot_password(&conn, &mailer, "ghost@example.org", "http://x"),
            Err(IdentityError::UserNotFound)
        ));
        assert!(mailer.sent().is_empty());
    }

    #[test]
    fn profile_update_ignores_other_role_fields() {
        let conn = open_memory_database().unwrap();
        let session = register(&conn, new_user("Grey", "grey@example.org", Role::Doctor), ttl()).unwrap();
        let principal = session.user.principal();

        let user = update_profile(
            &conn,
            &principal,
            ProfileUpdate {
                specialization: Some("Neurology".into()),
                age: Some(50),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(user.specialization.as_deref(), Some("Neurology"));
        assert_eq!(user.age, None);

        let profile = view_profile(&conn, &principal).unwrap();
        assert!(profile.connections.is_none());
    }

    #[test]
    fn patient_custom_fields_are_deduplicated() {
        let conn = open_memory_database().unwrap();
        let session = register(&conn, new_user("Ada", "ada@example.org", Role::Patient), ttl()).unwrap();
        let principal = session.user.principal();

        let user = update_profile(
            &conn,
            &principal,
            ProfileUpdate {
                custom_fields: Some(vec!["weight".into(), " weight ".into(), "".into(), "pulse".into()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(user.custom_fields, vec!["weight".to_string(), "pulse".to_string()]);
        assert_eq!(view_profile(&conn, &principal).unwrap().connections.map(|c| c.len()), Some(0));
    }
}
