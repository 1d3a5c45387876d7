//! Audit logging middleware.
//!
//! Logs every protected request with user_id, method, path and response
//! status under the `audit` target. Runs innermost (after auth has
//! injected `AuthContext`).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthContext;

pub async fn log_access(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let caller = req
        .extensions()
        .get::<AuthContext>()
        .map(|auth| (auth.user.id.to_string(), auth.user.role.as_str()));

    let response = next.run(req).await;

    let status = response.status().as_u16();
    match caller {
        Some((user_id, role)) => {
            tracing::info!(target: "audit", %method, %path, status, %user_id, role, "API access");
        }
        None => {
            tracing::info!(target: "audit", %method, %path, status, "API access (anonymous)");
        }
    }

    response
}
