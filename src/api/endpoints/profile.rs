//! Profile endpoints.
//!
//! `GET /api/profile/view`: the caller's account, plus connections for patients
//! `PUT /api/profile/update`: partial update of the caller's account

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::identity::{self, Profile};
use crate::models::{ProfileUpdate, User};

#[derive(Debug, Serialize)]
pub struct ProfileUpdateResponse {
    pub message: &'static str,
    pub user: User,
}

pub async fn view(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Profile>, ApiError> {
    let conn = ctx.core.open_db()?;
    let profile = identity::view_profile(&conn, &auth.principal())?;
    Ok(Json(profile))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<ProfileUpdateResponse>, ApiError> {
    let Json(update) = body?;
    let conn = ctx.core.open_db()?;
    let user = identity::update_profile(&conn, &auth.principal(), update)?;

    Ok(Json(ProfileUpdateResponse {
        message: "Profile updated",
        user,
    }))
}
