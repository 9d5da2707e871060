//! Booking Service
//!
//! Every query is filtered by the owning user, so another user's booking
//! behaves exactly like a missing one.

use crate::booking::models::*;
use sqlx::PgPool;
use uuid::Uuid;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Booking not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(err: validator::ValidationErrors) -> Self {
        BookingError::Validation(err.to_string())
    }
}

/// Booking service
pub struct BookingService {
    db: PgPool,
}

impl BookingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List the user's bookings, latest date first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let bookings = sqlx::query_as(
            r#"SELECT * FROM bookings
               WHERE user_id = $1
               ORDER BY booking_date DESC, booking_time DESC, id DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bookings)
    }

    /// Get one of the user's bookings
    pub async fn get(&self, id: i64, user_id: Uuid) -> Result<Booking, BookingError> {
        sqlx::query_as("SELECT * FROM bookings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(BookingError::NotFound(id))
    }

    /// Create a booking owned by `user_id`
    pub async fn create(&self, user_id: Uuid, req: BookingRequest) -> Result<Booking, BookingError> {
        let booking: Booking = sqlx::query_as(
            r#"INSERT INTO bookings (user_id, title, booking_date, booking_time, guests, notes)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING *"#,
        )
        .bind(user_id)
        .bind(&req.title)
        .bind(req.booking_date)
        .bind(req.booking_time)
        .bind(req.guests)
        .bind(&req.notes)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(booking_id = booking.id, user_id = %user_id, "Booking created");
        Ok(booking)
    }

    /// Replace the fields of one of the user's bookings
    pub async fn update(
        &self,
        id: i64,
        user_id: Uuid,
        req: BookingRequest,
    ) -> Result<Booking, BookingError> {
        let booking: Booking = sqlx::query_as(
            r#"UPDATE bookings SET
               title = $3, booking_date = $4, booking_time = $5,
               guests = $6, notes = $7, updated_at = NOW()
               WHERE id = $1 AND user_id = $2
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&req.title)
        .bind(req.booking_date)
        .bind(req.booking_time)
        .bind(req.guests)
        .bind(&req.notes)
        .fetch_optional(&self.db)
        .await?
        .ok_or(BookingError::NotFound(id))?;

        tracing::info!(booking_id = id, user_id = %user_id, "Booking updated");
        Ok(booking)
    }

    /// Delete one of the user's bookings
    pub async fn delete(&self, id: i64, user_id: Uuid) -> Result<(), BookingError> {
        let result = sqlx::query("DELETE FROM bookings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BookingError::NotFound(id));
        }

        tracing::info!(booking_id = id, user_id = %user_id, "Booking deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_test_user, test_pool};
    use chrono::{NaiveDate, NaiveTime};

    fn request(title: &str) -> BookingRequest {
        BookingRequest {
            title: title.into(),
            booking_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            booking_time: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            guests: 4,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_other_users_booking_is_not_found() {
        let Some(pool) = test_pool().await else { return };
        let bookings = BookingService::new(pool.clone());
        let owner = insert_test_user(&pool).await;
        let intruder = insert_test_user(&pool).await;

        let booking = bookings.create(owner, request("New year")).await.unwrap();

        assert!(matches!(
            bookings.get(booking.id, intruder).await,
            Err(BookingError::NotFound(id)) if id == booking.id
        ));
        assert!(matches!(
            bookings.update(booking.id, intruder, request("Hijacked")).await,
            Err(BookingError::NotFound(_))
        ));
        assert!(matches!(
            bookings.delete(booking.id, intruder).await,
            Err(BookingError::NotFound(_))
        ));
        assert!(bookings.list_for_user(intruder).await.unwrap().is_empty());

        // Untouched for the owner
        let stored = bookings.get(booking.id, owner).await.unwrap();
        assert_eq!(stored.title, "New year");

        bookings.delete(booking.id, owner).await.unwrap();
        assert!(matches!(
            bookings.get(booking.id, owner).await,
            Err(BookingError::NotFound(_))
        ));
    }
}
