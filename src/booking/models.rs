//! Booking Data Models

use crate::text::{normalize_field, normalize_optional_field, Normalize};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Booking owned by a single user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub title: String,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub guests: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/replace booking request. The owner always comes from the
/// authenticated caller.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    pub booking_date: NaiveDate,

    pub booking_time: NaiveTime,

    #[validate(range(min = 1, max = 20, message = "Guests must be between 1 and 20"))]
    pub guests: i32,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl Normalize for BookingRequest {
    fn normalize(&mut self) {
        normalize_field(&mut self.title);
        self.title = self.title.trim().to_string();
        normalize_optional_field(&mut self.notes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, guests: i32) -> BookingRequest {
        BookingRequest {
            title: title.into(),
            booking_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            booking_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
            guests,
            notes: None,
        }
    }

    #[test]
    fn test_booking_request_validation() {
        assert!(request("Dinner", 2).validate().is_ok());
        assert!(request("Dinner", 0).validate().is_err());
        assert!(request("Dinner", 21).validate().is_err());
        assert!(request("", 2).validate().is_err());
        assert!(request(&"x".repeat(201), 2).validate().is_err());
    }

    #[test]
    fn test_blank_title_rejected_after_normalization() {
        let req = request("   ", 2).normalized();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_booking_request_from_json() {
        let req: BookingRequest = serde_json::from_str(
            r#"{"title":"Cafe\u0301 table","booking_date":"2026-11-02","booking_time":"19:30:00","guests":4,"notes":null}"#,
        )
        .unwrap();
        let req = req.normalized();
        assert_eq!(req.title, "Caf\u{00e9} table");
        assert_eq!(req.guests, 4);
    }

    #[test]
    fn test_owner_not_serialized() {
        let now = Utc::now();
        let booking = Booking {
            id: 7,
            user_id: Uuid::new_v4(),
            title: "Court 3".into(),
            booking_date: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            booking_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            guests: 2,
            notes: Some("Bring rackets".into()),
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(&booking).unwrap();
        assert!(value.get("user_id").is_none());
        assert_eq!(value["id"], 7);
    }
}
