//! Booking Module
//!
//! Create/list/update/delete of bookings, scoped to the authenticated user.

pub mod handlers;
pub mod models;
pub mod service;

pub use models::{Booking, BookingRequest};
pub use service::{BookingError, BookingService};

use crate::accounts::AuthService;
use crate::middleware::auth::require_auth;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;

/// Create booking routes. All of them require authentication.
pub fn create_routes(bookings: Arc<BookingService>, auth_service: Arc<AuthService>) -> Router {
    Router::new()
        .route(
            "/bookings",
            get(handlers::list_bookings).post(handlers::create_booking),
        )
        .route(
            "/bookings/:id",
            get(handlers::get_booking)
                .put(handlers::update_booking)
                .delete(handlers::delete_booking),
        )
        .layer(axum_middleware::from_fn_with_state(auth_service, require_auth))
        .with_state(bookings)
}
