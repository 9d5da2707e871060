//! Account Error Types
//!
//! Centralized error handling for registration, login and profile operations.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Account and authentication errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked. Try again later")]
    AccountLocked,

    #[error("Account is not active")]
    AccountNotActive,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Invalid verification code. Please log in again")]
    InvalidCode,

    #[error("Verification code expired. Please log in again")]
    CodeExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Username already taken")]
    UsernameExists,

    #[error("Email already registered")]
    EmailExists,

    #[error("Password does not meet requirements")]
    WeakPassword,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// HTTP status and stable machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::AccountLocked => (StatusCode::FORBIDDEN, "account_locked"),
            AuthError::AccountNotActive => (StatusCode::FORBIDDEN, "account_not_active"),
            AuthError::InvalidToken | AuthError::TokenRevoked => {
                (StatusCode::UNAUTHORIZED, "invalid_token")
            }
            AuthError::InvalidCode => (StatusCode::UNAUTHORIZED, "invalid_code"),
            AuthError::CodeExpired => (StatusCode::UNAUTHORIZED, "code_expired"),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found"),
            AuthError::UsernameExists => (StatusCode::CONFLICT, "username_exists"),
            AuthError::EmailExists => (StatusCode::CONFLICT, "email_exists"),
            AuthError::WeakPassword => (StatusCode::BAD_REQUEST, "weak_password"),
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AuthError::Mail(_) => (StatusCode::BAD_GATEWAY, "mail_error"),
            AuthError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AuthError::Database(_) | AuthError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let message = match &self {
            AuthError::Validation(msg) | AuthError::Config(msg) => msg.clone(),
            AuthError::Mail(_) => "Could not deliver the verification email".to_string(),
            AuthError::Database(_) | AuthError::Internal => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("JWT error: {:?}", err);
        AuthError::InvalidToken
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::InvalidCode.status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::UsernameExists.status_and_code(),
            (StatusCode::CONFLICT, "username_exists")
        );
        assert_eq!(
            AuthError::AccountLocked.status_and_code().0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::Mail("smtp down".into()).status_and_code().0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = AuthError::Database("relation users does not exist".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
