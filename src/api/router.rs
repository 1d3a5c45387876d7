//! HTTP API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Middleware stack on protected routes (outermost → innermost):
//! 1. Auth validator → 2. Rate limiter (per user) → 3. Audit logger
//!
//! Public routes are rate limited per peer address.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::{MAX_FILE_BYTES, MAX_UPLOAD_FILES};
use crate::core_state::CoreState;

/// Multipart envelope allowance on top of the file payload.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    let ctx = ApiContext::new(core);
    build_router(ctx)
}

/// Build router from a pre-constructed `ApiContext` (custom rate limits in tests).
#[cfg(test)]
pub(crate) fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn cors_layer(public_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match HeaderValue::from_str(public_url.trim_end_matches('/')) {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!(public_url, "Public URL is not a valid origin, CORS disabled");
            cors
        }
    }
}

fn build_router(ctx: ApiContext) -> Router {
    let upload_limit = DefaultBodyLimit::max(MAX_UPLOAD_FILES * MAX_FILE_BYTES + MULTIPART_OVERHEAD);
    let update_limit = DefaultBodyLimit::max(MAX_FILE_BYTES + MULTIPART_OVERHEAD);

    // Protected routes: require a bearer session + full middleware stack
    //
    // Layers are applied from bottom (innermost) to top (outermost):
    //   Extension (outermost) → Auth → Rate limit → Audit (innermost) → Handler
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(endpoints::auth::logout))
        .route("/profile/view", get(endpoints::profile::view))
        .route("/profile/update", put(endpoints::profile::update))
        .route("/connections/request", post(endpoints::connections::request))
        .route("/connections/approve", post(endpoints::connections::approve))
        .route(
            "/connections/connected-doctors",
            get(endpoints::connections::connected_doctors),
        )
        .route(
            "/connections/connected-patients",
            get(endpoints::connections::connected_patients),
        )
        .route("/connections/pending", get(endpoints::connections::pending))
        .route(
            "/connections/disconnect",
            delete(endpoints::connections::disconnect),
        )
        .route("/connections/cancel", delete(endpoints::connections::cancel))
        .route(
            "/connections/update-access",
            patch(endpoints::connections::update_access),
        )
        .route("/logs/create", post(endpoints::logs::create))
        .route("/logs/all", get(endpoints::logs::all))
        .route("/logs/delete", delete(endpoints::logs::delete))
        .route("/notes/create", post(endpoints::notes::create))
        .route("/notes/all", get(endpoints::notes::all))
        .route(
            "/reports/upload",
            post(endpoints::reports::upload).layer(upload_limit),
        )
        .route("/reports/all", get(endpoints::reports::all))
        .route(
            "/reports/update",
            put(endpoints::reports::update).layer(update_limit),
        )
        .route("/reports/delete", delete(endpoints::reports::delete))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Unprotected routes (rate-limited only, no auth required)
    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/auth/check-email", post(endpoints::auth::check_email))
        .route(
            "/auth/forgot-password",
            post(endpoints::auth::forgot_password),
        )
        .route(
            "/auth/reset-password/:token/:id",
            post(endpoints::auth::reset_password),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::Extension(ctx.clone()));

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .layer(cors_layer(&ctx.core.config.public_url))
}
