//! Accounts Module
//!
//! - Registration with normalized, validated usernames and emails
//! - Two-step login: password, then a 6-digit code sent by email
//! - Refresh token rotation and logout
//! - Profile editing and password change

pub mod handlers;
pub mod models;
pub mod otp;
pub mod service;

pub use models::*;
pub use otp::EmailOtp;
pub use service::AuthService;

use crate::config::RateLimitSettings;
use crate::middleware::{auth::require_auth, rate_limit::rate_limiter, rate_limit::RateLimiter};

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Rate limiters guarding the login steps
#[derive(Clone)]
pub struct LoginLimiters {
    pub login: Arc<RateLimiter>,
    pub mfa: Arc<RateLimiter>,
}

impl LoginLimiters {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            login: Arc::new(RateLimiter::new(
                "login",
                settings.login_per_window,
                settings.window,
            )),
            mfa: Arc::new(RateLimiter::new(
                "mfa_verify",
                settings.mfa_per_window,
                settings.window,
            )),
        }
    }

    pub fn all(&self) -> Vec<Arc<RateLimiter>> {
        vec![self.login.clone(), self.mfa.clone()]
    }
}

/// Create account routes
pub fn create_routes(auth_service: Arc<AuthService>, limiters: &LoginLimiters) -> Router {
    let login = Router::new()
        .route("/accounts/login", post(handlers::login))
        .layer(axum_middleware::from_fn_with_state(
            limiters.login.clone(),
            rate_limiter,
        ));

    let mfa = Router::new()
        .route("/accounts/mfa-verify", post(handlers::mfa_verify))
        .layer(axum_middleware::from_fn_with_state(
            limiters.mfa.clone(),
            rate_limiter,
        ));

    // Public routes (no authentication required)
    let public = Router::new()
        .route("/accounts/register", post(handlers::register))
        .route("/accounts/logout", post(handlers::logout))
        .route("/accounts/refresh", post(handlers::refresh_token))
        .merge(login)
        .merge(mfa);

    // Protected routes (require authentication)
    let protected = Router::new()
        .route(
            "/accounts/profile",
            get(handlers::get_profile).put(handlers::edit_profile),
        )
        .route("/accounts/change-password", post(handlers::change_password))
        .layer(axum_middleware::from_fn_with_state(
            auth_service.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(auth_service)
}
