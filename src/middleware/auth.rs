//! Authentication Middleware
//!
//! Bearer access-token validation. Valid claims are stored in request
//! extensions for the `AuthUser` extractor.

use crate::accounts::service::AuthService;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

fn unauthorized(error: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

/// Require authenticated user
pub async fn require_auth(
    State(auth): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("unauthorized", "Authentication required"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("unauthorized", "Invalid authorization header format"))?;

    let claims = auth.validate_access_token(token).map_err(|e| {
        tracing::debug!("Access token rejected: {:?}", e);
        unauthorized("invalid_token", "Invalid or expired token")
    })?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
