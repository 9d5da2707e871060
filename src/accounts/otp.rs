//! Email One-Time Codes
//!
//! Each user owns at most one code row. A login attempt overwrites it with a
//! fresh 6-digit code; the code stays usable for a fixed window after creation
//! and is cleared once it has been checked, whatever the outcome.

use crate::error::AuthError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::FromRow;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Default validity window of a code
pub const OTP_TTL_SECONDS: i64 = 5 * 60;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// One-time code bound to a single user (`email_otps` table)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmailOtp {
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of checking a submitted code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Mismatch,
    Expired,
    Missing,
}

impl OtpCheck {
    /// Only `Valid` lets a login through. Every other outcome has already
    /// consumed the stored code, so the user must start over.
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            OtpCheck::Valid => Ok(()),
            OtpCheck::Expired => Err(AuthError::CodeExpired),
            OtpCheck::Mismatch | OtpCheck::Missing => Err(AuthError::InvalidCode),
        }
    }
}

impl EmailOtp {
    /// A fresh code for `user_id`, created at `now`
    pub fn issue(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            code: Some(generate_code()),
            created_at: now,
        }
    }

    /// True while `now` is strictly before `created_at + ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now < self.created_at + ttl
    }

    /// Compare a submitted code against the stored one
    pub fn check(&self, submitted: &str, now: DateTime<Utc>, ttl: Duration) -> OtpCheck {
        let Some(expected) = self.code.as_deref() else {
            return OtpCheck::Missing;
        };

        if !self.is_valid_at(now, ttl) {
            return OtpCheck::Expired;
        }

        if bool::from(expected.as_bytes().ct_eq(submitted.as_bytes())) {
            OtpCheck::Valid
        } else {
            OtpCheck::Mismatch
        }
    }
}

/// Uniform random 6-digit numeric code
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> Duration {
        Duration::seconds(OTP_TTL_SECONDS)
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(code.as_bytes()[0], b'0');
        }
    }

    #[test]
    fn test_validity_window_is_exclusive() {
        let created = Utc::now();
        let otp = EmailOtp {
            user_id: Uuid::new_v4(),
            code: Some("123456".into()),
            created_at: created,
        };

        assert!(otp.is_valid_at(created, ttl()));
        assert!(otp.is_valid_at(created + Duration::seconds(299), ttl()));
        assert!(!otp.is_valid_at(created + Duration::seconds(300), ttl()));
        assert!(!otp.is_valid_at(created + Duration::minutes(10), ttl()));
    }

    #[test]
    fn test_check_outcomes() {
        let created = Utc::now();
        let otp = EmailOtp {
            user_id: Uuid::new_v4(),
            code: Some("482913".into()),
            created_at: created,
        };

        assert_eq!(otp.check("482913", created, ttl()), OtpCheck::Valid);
        assert_eq!(otp.check("482914", created, ttl()), OtpCheck::Mismatch);
        assert_eq!(otp.check("48291", created, ttl()), OtpCheck::Mismatch);
        assert_eq!(
            otp.check("482913", created + Duration::minutes(5), ttl()),
            OtpCheck::Expired
        );

        let cleared = EmailOtp { code: None, ..otp };
        assert_eq!(cleared.check("482913", created, ttl()), OtpCheck::Missing);
    }

    #[test]
    fn test_issue_replaces_code() {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let otp = EmailOtp::issue(user_id, now);
        assert_eq!(otp.user_id, user_id);
        assert_eq!(otp.created_at, now);
        assert!(otp.is_valid_at(now, ttl()));
        assert_eq!(otp.code.as_ref().map(String::len), Some(6));
    }

    #[test]
    fn test_only_valid_outcome_passes() {
        assert!(OtpCheck::Valid.into_result().is_ok());
        assert!(matches!(
            OtpCheck::Expired.into_result(),
            Err(AuthError::CodeExpired)
        ));
        assert!(matches!(
            OtpCheck::Mismatch.into_result(),
            Err(AuthError::InvalidCode)
        ));
        assert!(matches!(
            OtpCheck::Missing.into_result(),
            Err(AuthError::InvalidCode)
        ));
    }
}
