//! Booking Portal API
//!
//! Account management and per-user bookings:
//! - Registration with Unicode-normalized, validated usernames and emails
//! - Login with a second factor: a 6-digit code sent by email, valid 5 minutes
//! - JWT access tokens with rotating refresh tokens
//! - Profile editing and password change
//! - Booking create/list/update/delete, visible only to the owner
//! - Per-address rate limits on both login steps, keyed by the socket peer
//!   (or, behind a configured trusted proxy, the forwarded client address)
//!
//! # Configuration
//!
//! All configuration is loaded from environment variables, see
//! [`config::AppConfig`]. `DATABASE_URL` and `JWT_SECRET` are required.
//!
//! # Usage
//!
//! ```rust,ignore
//! use booking_portal::{App, AppConfig};
//!
//! let config = AppConfig::from_env()?;
//! config.validate()?;
//! let app = App::activate(&config).await?;
//! axum::serve(
//!     listener,
//!     app.routes().into_make_service_with_connect_info::<SocketAddr>(),
//! )
//! .await?;
//! ```

pub mod accounts;
pub mod booking;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod mail;
pub mod middleware;
pub mod text;

pub use config::{AppConfig, AuthConfig};
pub use error::AuthError;
pub use extractors::{AuthUser, ClientInfo, TrustedProxies};

use accounts::{AuthService, LoginLimiters};
use axum::{routing::get, Extension, Json, Router};
use booking::BookingService;
use mail::Mailer;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Aggregated services container
pub struct App {
    pub auth: Arc<AuthService>,
    pub bookings: Arc<BookingService>,
    pub limiters: LoginLimiters,
    pub trusted_proxies: TrustedProxies,
}

impl App {
    /// Wire services around an existing pool
    pub fn new(db: PgPool, config: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            auth: Arc::new(AuthService::new(db.clone(), config.auth.clone(), mailer)),
            bookings: Arc::new(BookingService::new(db)),
            limiters: LoginLimiters::new(&config.rate_limit),
            trusted_proxies: TrustedProxies::new(config.trusted_proxies.clone()),
        }
    }

    /// Connect, migrate and build the services
    pub async fn activate(config: &AppConfig) -> Result<Self, AuthError> {
        tracing::info!("Activating booking portal");

        let db = db::connect(config).await?;
        db::run_migrations(&db).await?;

        let mailer = mail::from_config(&config.mail)?;

        tracing::info!("Booking portal activated successfully");
        Ok(Self::new(db, config, mailer))
    }

    /// All HTTP routes
    pub fn routes(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .merge(accounts::create_routes(self.auth.clone(), &self.limiters))
            .merge(booking::create_routes(
                self.bookings.clone(),
                self.auth.clone(),
            ))
            .layer(Extension(self.trusted_proxies.clone()))
            .layer(TraceLayer::new_for_http())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================
// Router Tests
// ============================================
