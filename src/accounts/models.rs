//! Account Models
//!
//! Data structures for account requests, responses, and database entities.

use crate::text::{normalize_field, normalize_optional_field, Normalize};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ============================================
// Database Entities
// ============================================

/// User entity from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check if user account is locked
    pub fn is_locked(&self) -> bool {
        self.is_locked_at(Utc::now())
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if until > now)
    }
}

/// Refresh token entity from database
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RefreshToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_valid(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }
}

// ============================================
// Request DTOs
// ============================================

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "crate::text::validate_username"))]
    pub username: String,

    #[validate(custom(function = "crate::text::validate_email_address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password1: String,

    #[validate(must_match(other = "password1", message = "Passwords do not match"))]
    pub password2: String,
}

impl Normalize for RegisterRequest {
    fn normalize(&mut self) {
        normalize_field(&mut self.username);
        normalize_field(&mut self.email);
        normalize_field(&mut self.password1);
        normalize_field(&mut self.password2);
    }
}

/// Login request (first step)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl Normalize for LoginRequest {
    fn normalize(&mut self) {
        normalize_field(&mut self.username);
        normalize_field(&mut self.password);
    }
}

/// One-time code verification request (second step)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MfaVerifyRequest {
    #[validate(length(min = 1, message = "MFA token is required"))]
    pub mfa_token: String,

    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

impl Normalize for MfaVerifyRequest {
    fn normalize(&mut self) {
        normalize_field(&mut self.code);
        self.code = self.code.trim().to_string();
    }
}

/// Refresh token request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Profile update request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileUpdateRequest {
    #[validate(custom(function = "crate::text::validate_username"))]
    pub username: String,

    #[validate(custom(function = "crate::text::validate_email_address"))]
    pub email: String,

    #[validate(length(max = 150, message = "First name must be at most 150 characters"))]
    #[serde(default)]
    pub first_name: Option<String>,

    #[validate(length(max = 150, message = "Last name must be at most 150 characters"))]
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Normalize for ProfileUpdateRequest {
    fn normalize(&mut self) {
        normalize_field(&mut self.username);
        normalize_field(&mut self.email);
        normalize_optional_field(&mut self.first_name);
        normalize_optional_field(&mut self.last_name);
    }
}

/// Change password request (for authenticated users)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,

    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password1: String,

    #[validate(must_match(other = "new_password1", message = "Passwords do not match"))]
    pub new_password2: String,
}

impl Normalize for ChangePasswordRequest {
    fn normalize(&mut self) {
        normalize_field(&mut self.old_password);
        normalize_field(&mut self.new_password1);
        normalize_field(&mut self.new_password2);
    }
}

// ============================================
// Response DTOs
// ============================================

/// User response (public user data without sensitive fields)
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

/// Returned by the first login step: the code was sent, the session is pending
#[derive(Debug, Clone, Serialize)]
pub struct MfaChallengeResponse {
    pub mfa_required: bool,
    pub mfa_token: String,
    pub expires_in: i64,
    pub message: String,
}

/// Authentication response with tokens
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Token pair response
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Simple message response
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================
// JWT Claims
// ============================================

/// JWT claims for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    /// Issued at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// JWT ID (unique identifier)
    pub jti: Uuid,
}

/// Token purpose carried by pending-login tokens
pub const MFA_PURPOSE: &str = "mfa";

/// JWT claims identifying a user who passed the password check but has
/// not yet entered the emailed code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaTokenClaims {
    /// Subject (pending user ID)
    pub sub: Uuid,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: Uuid,
}

/// JWT claims for refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Token ID (references refresh_tokens table)
    pub tid: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn register(username: &str, email: &str, p1: &str, p2: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password1: p1.into(),
            password2: p2.into(),
        }
    }

    #[test]
    fn test_register_request_valid() {
        let req = register("alice_01", "alice@example.com", "Secret123", "Secret123");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_register_request_rejects_bad_fields() {
        let req = register("al", "alice@example.com", "Secret123", "Secret123");
        assert!(req.validate().is_err());

        let req = register("alice", "alice-at-example", "Secret123", "Secret123");
        assert!(req.validate().is_err());

        let req = register("alice", "alice@example.com", "Secret123", "Secret124");
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password2"));
    }

    #[test]
    fn test_register_normalizes_before_validation() {
        let req = register(
            "bob",
            "jose\u{0301}@example.com",
            "Secret123",
            "Secret123",
        )
        .normalized();
        assert_eq!(req.email, "jos\u{00e9}@example.com");
    }

    #[test]
    fn test_profile_update_name_length() {
        let req = ProfileUpdateRequest {
            username: "carol".into(),
            email: "carol@example.com".into(),
            first_name: Some("C".repeat(151)),
            last_name: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_mfa_code_trimmed() {
        let req = MfaVerifyRequest {
            mfa_token: "t".into(),
            code: " 123456 ".into(),
        }
        .normalized();
        assert_eq!(req.code, "123456");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_user_lock_state() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            username: "dave".into(),
            email: "dave@example.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            last_login_at: None,
            last_login_ip: None,
            failed_login_attempts: 0,
            locked_until: None,
            password_changed_at: now,
            created_at: now,
            updated_at: now,
        };
        assert!(!user.is_locked_at(now));

        user.locked_until = Some(now + Duration::minutes(1));
        assert!(user.is_locked_at(now));
        assert!(!user.is_locked_at(now + Duration::minutes(2)));

        let response = UserResponse::from(user);
        assert_eq!(response.username, "dave");
    }
}
