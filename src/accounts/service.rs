//! Account Service
//!
//! Core account logic: password hashing, the two-step email code login,
//! JWT generation and refresh token management.

use crate::accounts::models::*;
use crate::accounts::otp::{EmailOtp, OtpCheck};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mail::{Mailer, OutgoingMail};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Account service
pub struct AuthService {
    db: PgPool,
    config: AuthConfig,
    mailer: Arc<dyn Mailer>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    /// Create a new account service
    pub fn new(db: PgPool, config: AuthConfig, mailer: Arc<dyn Mailer>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Self {
            db,
            config,
            mailer,
            encoding_key,
            decoding_key,
        }
    }

    pub fn db(&self) -> &PgPool {
        &self.db
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ============================================
    // Password Hashing
    // ============================================

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            self.config.argon2_memory_cost,
            self.config.argon2_time_cost,
            self.config.argon2_parallelism,
            None,
        )
        .map_err(|_| AuthError::Internal)?;

        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }

    /// Hash a password using Argon2id
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)?
            .to_string();

        Ok(hash)
    }

    /// Verify a password against a hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::Internal)?;

        Ok(self
            .argon2()?
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Validate password strength
    pub fn validate_password(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.config.min_password_length {
            return Err(AuthError::WeakPassword);
        }

        // At least one uppercase, lowercase, and digit
        let has_upper = password.chars().any(|c| c.is_uppercase());
        let has_lower = password.chars().any(|c| c.is_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if !has_upper || !has_lower || !has_digit {
            return Err(AuthError::WeakPassword);
        }

        Ok(())
    }

    // ============================================
    // JWT Token Generation
    // ============================================

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);
        validation
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.access_token_expiration);

        let claims = AccessTokenClaims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            jti: Uuid::new_v4(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Validate an access token
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation())?;
        Ok(token_data.claims)
    }

    /// Generate the pending-login token handed out after the password check.
    /// It expires together with the emailed code.
    pub fn generate_mfa_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.otp_ttl);

        let claims = MfaTokenClaims {
            sub: user_id,
            purpose: MFA_PURPOSE.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            jti: Uuid::new_v4(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Validate a pending-login token and return the pending user ID
    pub fn validate_mfa_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let mut validation = self.validation();
        validation.leeway = 0;

        let claims = decode::<MfaTokenClaims>(token, &self.decoding_key, &validation)?.claims;
        if claims.purpose != MFA_PURPOSE {
            return Err(AuthError::InvalidToken);
        }

        Ok(claims.sub)
    }

    /// Generate a refresh token
    pub async fn generate_refresh_token(
        &self,
        user_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<String, AuthError> {
        let token_id = Uuid::new_v4();
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.refresh_token_expiration);

        let token_bytes: [u8; 32] = rand::thread_rng().gen();
        let token_string = hex::encode(token_bytes);
        let token_hash = hash_token(&token_string);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token_id)
        .bind(user_id)
        .bind(&token_hash)
        .bind(exp)
        .bind(&ip_address)
        .bind(&user_agent)
        .execute(&self.db)
        .await?;

        let claims = RefreshTokenClaims {
            sub: user_id,
            tid: token_id,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
        };

        let jwt = encode(&Header::default(), &claims, &self.encoding_key)?;

        // JWT + random string for extra verification
        Ok(format!("{}.{}", jwt, token_string))
    }

    async fn issue_token_pair(
        &self,
        user: &User,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<TokenResponse, AuthError> {
        let access_token = self.generate_access_token(user)?;
        let refresh_token = self
            .generate_refresh_token(user.id, ip_address, user_agent)
            .await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration,
        })
    }

    // ============================================
    // Registration
    // ============================================

    /// Register a new user. The request must already be normalized and validated.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, AuthError> {
        self.validate_password(&req.password1)?;

        let username_taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = $1")
                .bind(&req.username)
                .fetch_optional(&self.db)
                .await?;
        if username_taken.is_some() {
            return Err(AuthError::UsernameExists);
        }

        let email_taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(&req.email)
                .fetch_optional(&self.db)
                .await?;
        if email_taken.is_some() {
            return Err(AuthError::EmailExists);
        }

        let password_hash = self.hash_password(&req.password1)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&req.username)
        .bind(&req.email)
        .bind(&password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique_violation)?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(user)
    }

    // ============================================
    // Login (two steps)
    // ============================================

    /// First step: check the password, then email a fresh code and hand
    /// back a pending-login token.
    pub async fn login(
        &self,
        req: LoginRequest,
        ip_address: Option<String>,
    ) -> Result<MfaChallengeResponse, AuthError> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(&req.username)
            .fetch_optional(&self.db)
            .await?;

        let user = user.ok_or_else(|| {
            tracing::info!(username = %req.username, ip = ?ip_address, "Login for unknown user");
            AuthError::InvalidCredentials
        })?;

        ensure_can_login(&user)?;

        if !self.verify_password(&req.password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, ip = ?ip_address, "Failed login attempt");
            self.increment_failed_attempts(user.id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        let otp = self.issue_code(user.id).await?;
        let code = otp.code.as_deref().ok_or(AuthError::Internal)?;

        self.mailer
            .send(OutgoingMail::login_code(&user.email, code, self.config.otp_ttl))
            .await?;

        tracing::info!(user_id = %user.id, "Login code sent");

        Ok(MfaChallengeResponse {
            mfa_required: true,
            mfa_token: self.generate_mfa_token(user.id)?,
            expires_in: self.config.otp_ttl,
            message: "A verification code has been sent to your email.".to_string(),
        })
    }

    /// Store a fresh code for the user, replacing any previous one
    async fn issue_code(&self, user_id: Uuid) -> Result<EmailOtp, AuthError> {
        let otp = EmailOtp::issue(user_id, Utc::now());

        let stored = sqlx::query_as::<_, EmailOtp>(
            r#"
            INSERT INTO email_otps (user_id, code, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET code = EXCLUDED.code, created_at = EXCLUDED.created_at
            RETURNING user_id, code, created_at
            "#,
        )
        .bind(otp.user_id)
        .bind(&otp.code)
        .bind(otp.created_at)
        .fetch_one(&self.db)
        .await?;

        Ok(stored)
    }

    /// Atomically read and clear the user's code
    async fn take_code(&self, user_id: Uuid) -> Result<Option<EmailOtp>, AuthError> {
        let taken = sqlx::query_as::<_, EmailOtp>(
            r#"
            WITH prev AS (
                SELECT user_id, code, created_at FROM email_otps
                WHERE user_id = $1
                FOR UPDATE
            )
            UPDATE email_otps o SET code = NULL
            FROM prev
            WHERE o.user_id = prev.user_id
            RETURNING prev.user_id, prev.code, prev.created_at
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(taken)
    }

    /// Second step: compare the submitted code and, on a match, establish
    /// the authenticated session. Any failure discards the code.
    pub async fn verify_mfa(
        &self,
        req: MfaVerifyRequest,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<AuthResponse, AuthError> {
        let user_id = self.validate_mfa_token(&req.mfa_token)?;

        let outcome = match self.take_code(user_id).await? {
            Some(otp) => otp.check(&req.code, Utc::now(), Duration::seconds(self.config.otp_ttl)),
            None => OtpCheck::Missing,
        };

        if let Err(err) = outcome.into_result() {
            tracing::warn!(
                user_id = %user_id,
                ip = ?ip_address,
                outcome = ?outcome,
                "Login code rejected, restart required"
            );
            return Err(err);
        }

        let user = self.get_user(user_id).await?.ok_or(AuthError::UserNotFound)?;

        ensure_can_login(&user)?;

        self.record_successful_login(user.id, ip_address.clone())
            .await?;

        let tokens = self.issue_token_pair(&user, ip_address, user_agent).await?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(AuthResponse {
            user: UserResponse::from(user),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
        })
    }

    // ============================================
    // Logout / Token Refresh
    // ============================================

    fn split_refresh_token<'a>(&self, refresh_token: &'a str) -> Result<(&'a str, &'a str), AuthError> {
        // "<jwt>.<random>": the JWT itself contains dots, so split from the right
        refresh_token
            .rsplit_once('.')
            .ok_or(AuthError::InvalidToken)
    }

    /// Logout by revoking refresh token
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let (jwt_part, token_string) = self.split_refresh_token(refresh_token)?;

        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.validate_exp = false;

        let claims = decode::<RefreshTokenClaims>(jwt_part, &self.decoding_key, &validation)?.claims;

        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE id = $1 AND token_hash = $2 AND revoked_at IS NULL",
        )
        .bind(claims.tid)
        .bind(hash_token(token_string))
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(user_id = %claims.sub, "User logged out");
        }

        Ok(())
    }

    /// Refresh access token using refresh token (with rotation)
    pub async fn refresh_tokens(
        &self,
        refresh_token: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<TokenResponse, AuthError> {
        let (jwt_part, token_string) = self.split_refresh_token(refresh_token)?;

        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.jwt_issuer]);

        let claims = decode::<RefreshTokenClaims>(jwt_part, &self.decoding_key, &validation)?.claims;

        let stored_token: RefreshToken = sqlx::query_as(
            "SELECT * FROM refresh_tokens WHERE id = $1 AND token_hash = $2",
        )
        .bind(claims.tid)
        .bind(hash_token(token_string))
        .fetch_optional(&self.db)
        .await?
        .ok_or(AuthError::InvalidToken)?;

        if !stored_token.is_valid() {
            if stored_token.is_revoked() {
                tracing::warn!(
                    user_id = %claims.sub,
                    "Refresh token reuse detected, revoking all tokens"
                );
                self.revoke_all_tokens(claims.sub).await?;
            }
            return Err(AuthError::TokenRevoked);
        }

        let user = self
            .get_user(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        ensure_can_login(&user)?;

        let tokens = self.issue_token_pair(&user, ip_address, user_agent).await?;

        // Rotation
        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE id = $1")
            .bind(claims.tid)
            .execute(&self.db)
            .await?;

        Ok(tokens)
    }

    /// Revoke all refresh tokens for a user
    async fn revoke_all_tokens(&self, user_id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    // ============================================
    // Profile / Password
    // ============================================

    /// Update username, email and names. The request must already be
    /// normalized and validated.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: ProfileUpdateRequest,
    ) -> Result<User, AuthError> {
        let username_taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = $1 AND id <> $2")
                .bind(&req.username)
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;
        if username_taken.is_some() {
            return Err(AuthError::UsernameExists);
        }

        let email_taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE LOWER(email) = LOWER($1) AND id <> $2")
                .bind(&req.email)
                .bind(user_id)
                .fetch_optional(&self.db)
                .await?;
        if email_taken.is_some() {
            return Err(AuthError::EmailExists);
        }

        let user: User = sqlx::query_as(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&req.username)
        .bind(&req.email)
        .bind(&req.first_name)
        .bind(&req.last_name)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique_violation)?
        .ok_or(AuthError::UserNotFound)?;

        tracing::info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }

    /// Change password for an authenticated user. Every existing refresh
    /// token is revoked and a fresh pair is returned so the calling client
    /// stays signed in.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        req: ChangePasswordRequest,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<TokenResponse, AuthError> {
        let user = self.get_user(user_id).await?.ok_or(AuthError::UserNotFound)?;

        if !self.verify_password(&req.old_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        self.validate_password(&req.new_password1)?;

        let password_hash = self.hash_password(&req.new_password1)?;

        sqlx::query(
            "UPDATE users SET password_hash = $1, password_changed_at = NOW(), updated_at = NOW() WHERE id = $2",
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        self.revoke_all_tokens(user_id).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        self.issue_token_pair(&user, ip_address, user_agent).await
    }

    // ============================================
    // User Helpers
    // ============================================

    /// Get user by ID
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    /// Increment failed login attempts, locking the account at the limit
    async fn increment_failed_attempts(&self, user_id: Uuid) -> Result<(), AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2
                    THEN NOW() + INTERVAL '1 second' * $3
                    ELSE locked_until
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(self.config.max_login_attempts)
        .bind(self.config.lockout_duration)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(user_id = %user_id, "Failed to increment login attempts");
        }

        Ok(())
    }

    /// Record successful login
    async fn record_successful_login(
        &self,
        user_id: Uuid,
        ip_address: Option<String>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            UPDATE users SET
                failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = NOW(),
                last_login_ip = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(ip_address)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

/// Lockout takes precedence over deactivation
fn ensure_can_login(user: &User) -> Result<(), AuthError> {
    if user.is_locked() {
        return Err(AuthError::AccountLocked);
    }
    if !user.is_active {
        return Err(AuthError::AccountNotActive);
    }
    Ok(())
}

/// SHA-256 of a token, hex encoded, for storage
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Map a unique-constraint race on `users` to the matching conflict error
fn map_unique_violation(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.constraint() {
            Some("users_username_key") => return AuthError::UsernameExists,
            Some("users_email_lower_idx") => return AuthError::EmailExists,
            _ => {}
        }
    }
    AuthError::from(err)
}
