//! Service Configuration
//!
//! All configuration values are loaded from environment variables.
//! No hardcoded secrets or sensitive data.

use crate::accounts::otp::OTP_TTL_SECONDS;
use crate::error::AuthError;
use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Read an environment variable and parse it, falling back to `default`
/// when it is unset or unparsable.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_required(key: &str) -> Result<String, AuthError> {
    env::var(key).map_err(|_| AuthError::Config(format!("{} environment variable must be set", key)))
}

/// Parse a comma separated list of proxy addresses
fn parse_trusted_proxies(value: &str) -> Result<Vec<IpAddr>, AuthError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| AuthError::Config(format!("TRUSTED_PROXIES: invalid address {}", s)))
        })
        .collect()
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Socket address to listen on (from BIND_ADDR env var)
    pub bind_addr: String,

    /// PostgreSQL connection string (from DATABASE_URL env var)
    pub database_url: String,

    /// Connection pool size (from DATABASE_MAX_CONNECTIONS env var)
    pub max_connections: u32,

    /// Reverse proxies allowed to set X-Forwarded-For / X-Real-IP
    /// (from TRUSTED_PROXIES env var, comma separated). Empty by default.
    pub trusted_proxies: Vec<IpAddr>,

    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub mail: MailConfig,
}

impl AppConfig {
    /// Load the full configuration from environment variables
    pub fn from_env() -> Result<Self, AuthError> {
        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            database_url: env_required("DATABASE_URL")?,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            trusted_proxies: parse_trusted_proxies(
                &env::var("TRUSTED_PROXIES").unwrap_or_default(),
            )?,
            auth: AuthConfig::from_env()?,
            rate_limit: RateLimitSettings::from_env(),
            mail: MailConfig::from_env(),
        })
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.max_connections == 0 {
            return Err(AuthError::Config(
                "DATABASE_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }
        self.auth.validate()?;
        self.rate_limit.validate()?;
        self.mail.validate()
    }
}

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing tokens (from JWT_SECRET env var)
    pub jwt_secret: String,

    /// JWT access token expiration in seconds (from JWT_ACCESS_EXPIRATION env var)
    pub access_token_expiration: i64,

    /// JWT refresh token expiration in seconds (from JWT_REFRESH_EXPIRATION env var)
    pub refresh_token_expiration: i64,

    /// JWT issuer (from JWT_ISSUER env var)
    pub jwt_issuer: String,

    /// JWT audience (from JWT_AUDIENCE env var)
    pub jwt_audience: String,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Maximum failed login attempts before lockout (from MAX_LOGIN_ATTEMPTS env var)
    pub max_login_attempts: i32,

    /// Account lockout duration in seconds (from LOCKOUT_DURATION env var)
    pub lockout_duration: i64,

    /// Minimum password length (from MIN_PASSWORD_LENGTH env var)
    pub min_password_length: usize,

    /// Lifetime of an emailed login code in seconds (from OTP_TTL env var)
    pub otp_ttl: i64,
}

impl AuthConfig {
    /// Load configuration from environment variables
    ///
    /// Fails if JWT_SECRET is not set.
    pub fn from_env() -> Result<Self, AuthError> {
        Ok(Self {
            jwt_secret: env_required("JWT_SECRET")?,
            access_token_expiration: env_parse("JWT_ACCESS_EXPIRATION", 900), // 15 minutes
            refresh_token_expiration: env_parse("JWT_REFRESH_EXPIRATION", 604800), // 7 days
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "booking-portal".to_string()),
            jwt_audience: env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "booking-portal-api".to_string()),
            argon2_memory_cost: env_parse("ARGON2_MEMORY_COST", 65536), // 64 MiB
            argon2_time_cost: env_parse("ARGON2_TIME_COST", 3),
            argon2_parallelism: env_parse("ARGON2_PARALLELISM", 4),
            max_login_attempts: env_parse("MAX_LOGIN_ATTEMPTS", 5),
            lockout_duration: env_parse("LOCKOUT_DURATION", 900), // 15 minutes
            min_password_length: env_parse("MIN_PASSWORD_LENGTH", 8),
            otp_ttl: env_parse("OTP_TTL", OTP_TTL_SECONDS),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.len() < 32 {
            return Err(AuthError::Config(
                "JWT_SECRET must be at least 32 characters".to_string(),
            ));
        }

        if self.access_token_expiration <= 0 {
            return Err(AuthError::Config(
                "JWT_ACCESS_EXPIRATION must be positive".to_string(),
            ));
        }

        if self.refresh_token_expiration <= self.access_token_expiration {
            return Err(AuthError::Config(
                "JWT_REFRESH_EXPIRATION must be greater than JWT_ACCESS_EXPIRATION".to_string(),
            ));
        }

        if self.min_password_length < 8 {
            return Err(AuthError::Config(
                "MIN_PASSWORD_LENGTH must be at least 8".to_string(),
            ));
        }

        if self.max_login_attempts <= 0 {
            return Err(AuthError::Config(
                "MAX_LOGIN_ATTEMPTS must be positive".to_string(),
            ));
        }

        if self.otp_ttl <= 0 {
            return Err(AuthError::Config("OTP_TTL must be positive".to_string()));
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn test() -> Self {
        Self {
            jwt_secret: "a".repeat(32),
            access_token_expiration: 900,
            refresh_token_expiration: 604800,
            jwt_issuer: "test".to_string(),
            jwt_audience: "test".to_string(),
            argon2_memory_cost: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            max_login_attempts: 5,
            lockout_duration: 900,
            min_password_length: 8,
            otp_ttl: OTP_TTL_SECONDS,
        }
    }
}

/// Per-route request budgets, keyed by client address
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Login attempts per window (from LOGIN_RATE_LIMIT env var)
    pub login_per_window: u32,

    /// Code verification attempts per window (from MFA_RATE_LIMIT env var)
    pub mfa_per_window: u32,

    /// Window length (from RATE_LIMIT_WINDOW env var, seconds)
    pub window: Duration,
}

impl RateLimitSettings {
    pub fn from_env() -> Self {
        Self {
            login_per_window: env_parse("LOGIN_RATE_LIMIT", 5),
            mfa_per_window: env_parse("MFA_RATE_LIMIT", 3),
            window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW", 60)),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.login_per_window == 0 || self.mfa_per_window == 0 {
            return Err(AuthError::Config(
                "rate limits must allow at least one request".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(AuthError::Config(
                "RATE_LIMIT_WINDOW must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_window: 5,
            mfa_per_window: 3,
            window: Duration::from_secs(60),
        }
    }
}

/// Outgoing mail settings. Without SMTP_HOST, mail is written to the log.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,

    /// Sender address (from MAIL_FROM env var)
    pub from_address: String,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            smtp_host: env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()),
            smtp_port: env_parse("SMTP_PORT", 587),
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            from_address: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.smtp_username.is_some() != self.smtp_password.is_some() {
            return Err(AuthError::Config(
                "SMTP_USERNAME and SMTP_PASSWORD must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(AuthConfig::test().validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_secret() {
        let config = AuthConfig {
            jwt_secret: "short".to_string(),
            ..AuthConfig::test()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_refresh_must_outlive_access() {
        let config = AuthConfig {
            refresh_token_expiration: 900,
            ..AuthConfig::test()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rate_limit_defaults() {
        let settings = RateLimitSettings::default();
        assert_eq!(settings.login_per_window, 5);
        assert_eq!(settings.mfa_per_window, 3);
        assert_eq!(settings.window, Duration::from_secs(60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_trusted_proxies_parsing() {
        assert!(parse_trusted_proxies("").unwrap().is_empty());
        assert_eq!(
            parse_trusted_proxies("10.0.0.1, ::1,").unwrap(),
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "::1".parse::<IpAddr>().unwrap()
            ]
        );
        assert!(matches!(
            parse_trusted_proxies("10.0.0.0/8"),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_smtp_credentials_come_in_pairs() {
        let mail = MailConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_port: 587,
            smtp_username: Some("user".to_string()),
            smtp_password: None,
            from_address: "no-reply@example.com".to_string(),
        };

        assert!(mail.validate().is_err());
    }
}
