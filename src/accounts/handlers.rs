//! Account HTTP Handlers
//!
//! REST API endpoints for registration, login, profile and password changes.

use crate::accounts::models::*;
use crate::accounts::service::AuthService;
use crate::error::AuthError;
use crate::extractors::{AuthUser, ClientInfo};
use crate::text::Normalize;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

/// Shared account service state
pub type AuthState = Arc<AuthService>;

// ============================================
// Registration
// ============================================

/// POST /accounts/register
pub async fn register(
    State(auth): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let req = req.normalized();
    req.validate()?;

    let user = auth.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Account created successfully. Please log in.",
            "user": UserResponse::from(user)
        })),
    ))
}

// ============================================
// Login / Logout
// ============================================

/// POST /accounts/login
///
/// Check credentials and email a one-time code
pub async fn login(
    State(auth): State<AuthState>,
    ClientInfo { ip, .. }: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let req = req.normalized();
    req.validate()?;

    let challenge = auth.login(req, ip).await?;

    Ok(Json(challenge))
}

/// POST /accounts/mfa-verify
///
/// Exchange the emailed code for access/refresh tokens
pub async fn mfa_verify(
    State(auth): State<AuthState>,
    ClientInfo { ip, user_agent }: ClientInfo,
    Json(req): Json<MfaVerifyRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let req = req.normalized();
    req.validate()?;

    let response = auth.verify_mfa(req, ip, user_agent).await?;

    Ok(Json(response))
}

/// POST /accounts/logout
pub async fn logout(
    State(auth): State<AuthState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    auth.logout(&req.refresh_token).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// POST /accounts/refresh
pub async fn refresh_token(
    State(auth): State<AuthState>,
    ClientInfo { ip, user_agent }: ClientInfo,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    req.validate()?;

    let response = auth
        .refresh_tokens(&req.refresh_token, ip, user_agent)
        .await?;

    Ok(Json(response))
}

// ============================================
// Profile
// ============================================

/// GET /accounts/profile
pub async fn get_profile(
    State(auth): State<AuthState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AuthError> {
    let user = auth.get_user(user.id).await?.ok_or(AuthError::UserNotFound)?;

    Ok(Json(serde_json::json!({
        "user": UserResponse::from(user)
    })))
}

/// PUT /accounts/profile
pub async fn edit_profile(
    State(auth): State<AuthState>,
    user: AuthUser,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let req = req.normalized();
    req.validate()?;

    let updated = auth.update_profile(user.id, req).await?;

    Ok(Json(serde_json::json!({
        "message": "Profile updated successfully.",
        "user": UserResponse::from(updated)
    })))
}

/// POST /accounts/change-password
///
/// Returns a fresh token pair; every other session is signed out
pub async fn change_password(
    State(auth): State<AuthState>,
    user: AuthUser,
    ClientInfo { ip, user_agent }: ClientInfo,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let req = req.normalized();
    req.validate()?;

    let tokens = auth.change_password(user.id, req, ip, user_agent).await?;

    Ok(Json(serde_json::json!({
        "message": "Password changed successfully.",
        "tokens": tokens
    })))
}
