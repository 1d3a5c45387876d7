//! Account endpoints.
//!
//! `POST /api/auth/register` (public): create an account, returns a session
//! `POST /api/auth/login` (public): exchange credentials for a session
//! `POST /api/auth/check-email` (public): is this email already registered
//! `POST /api/auth/forgot-password` (public): email a reset link
//! `POST /api/auth/reset-password/:token/:id` (public): consume a reset link
//! `POST /api/auth/logout` (authenticated): revoke the calling session

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::MessageResponse;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::identity::{self, AuthSession};
use crate::models::NewUser;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub session: AuthSession,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct EmailExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let Json(input) = body?;
    let conn = ctx.core.open_db()?;
    let session = identity::register(&conn, input, ctx.core.config.session_ttl)?;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            message: "Registered successfully",
            session,
        }),
    ))
}

/// `POST /api/auth/login`: unknown email is 404, wrong password is 401.
pub async fn login(
    State(ctx): State<ApiContext>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Json(request) = body?;
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    }

    let conn = ctx.core.open_db()?;
    let session = identity::login(
        &conn,
        &request.email,
        &request.password,
        ctx.core.config.session_ttl,
    )?;

    Ok(Json(SessionResponse {
        message: "Logged in successfully",
        session,
    }))
}

/// `POST /api/auth/check-email`
pub async fn check_email(
    State(ctx): State<ApiContext>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<EmailExistsResponse>, ApiError> {
    let Json(request) = body?;
    let conn = ctx.core.open_db()?;
    let exists = identity::check_email(&conn, &request.email)?;
    Ok(Json(EmailExistsResponse { exists }))
}

/// `POST /api/auth/forgot-password`
pub async fn forgot_password(
    State(ctx): State<ApiContext>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(request) = body?;
    if request.email.trim().is_empty() {
        return Err(ApiError::BadRequest("Email is required".into()));
    }

    let conn = ctx.core.open_db()?;
    identity::forgot_password(
        &conn,
        ctx.core.mailer.as_ref(),
        &request.email,
        &ctx.core.config.public_url,
    )?;

    Ok(Json(MessageResponse::new("Password reset link sent")))
}

/// `POST /api/auth/reset-password/:token/:id`
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    path: Result<Path<(String, Uuid)>, PathRejection>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path((token, user_id)) = path?;
    let Json(request) = body?;

    let conn = ctx.core.open_db()?;
    identity::reset_password(&conn, &user_id, &token, &request.password)?;

    Ok(Json(MessageResponse::new("Password has been reset")))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    identity::logout(&conn, &auth.token)?;

    tracing::info!(user_id = %auth.user.id, "Logged out");
    Ok(Json(MessageResponse::new("Logged out successfully")))
}
