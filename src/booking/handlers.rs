//! Booking Handlers

use crate::booking::models::*;
use crate::booking::service::{BookingError, BookingService};
use crate::extractors::AuthUser;
use crate::text::Normalize;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use validator::Validate;

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            BookingError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Booking not found".to_string(),
            ),
            BookingError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            BookingError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
        };

        (
            status,
            Json(serde_json::json!({
                "error": error,
                "message": message
            })),
        )
            .into_response()
    }
}

/// GET /bookings - List the caller's bookings
pub async fn list_bookings(
    State(bookings): State<Arc<BookingService>>,
    user: AuthUser,
) -> Result<impl IntoResponse, BookingError> {
    let list = bookings.list_for_user(user.id).await?;
    Ok(Json(serde_json::json!({ "bookings": list })))
}

/// GET /bookings/:id
pub async fn get_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    let booking = bookings.get(id, user.id).await?;
    Ok(Json(booking))
}

/// POST /bookings
pub async fn create_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthUser,
    Json(req): Json<BookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let req = req.normalized();
    req.validate()?;

    let booking = bookings.create(user.id, req).await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

/// PUT /bookings/:id
pub async fn update_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<BookingRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let req = req.normalized();
    req.validate()?;

    let booking = bookings.update(id, user.id, req).await?;

    Ok(Json(booking))
}

/// DELETE /bookings/:id
pub async fn delete_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, BookingError> {
    bookings.delete(id, user.id).await?;

    Ok(StatusCode::NO_CONTENT)
}
