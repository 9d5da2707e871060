//! Database Setup
//!
//! Connection pool creation and idempotent schema migrations.

use crate::config::AppConfig;
use crate::error::AuthError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Open the connection pool
pub async fn connect(config: &AppConfig) -> Result<PgPool, AuthError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    Ok(pool)
}

/// Advisory lock key held while migrating
const MIGRATION_LOCK: i64 = 0x626f_6f6b_696e_67;

/// Run database migrations
///
/// Runs in one transaction under an advisory lock, so instances starting
/// together apply the schema one at a time.
pub async fn run_migrations(db: &PgPool) -> Result<(), AuthError> {
    tracing::info!("Running database migrations");

    let mut tx = db.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK)
        .execute(&mut *tx)
        .await?;

    // Create users table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            username VARCHAR(150) NOT NULL UNIQUE,
            email VARCHAR(254) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            first_name VARCHAR(150) NOT NULL DEFAULT '',
            last_name VARCHAR(150) NOT NULL DEFAULT '',
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            last_login_at TIMESTAMPTZ,
            last_login_ip VARCHAR(45),
            failed_login_attempts INTEGER NOT NULL DEFAULT 0,
            locked_until TIMESTAMPTZ,
            password_changed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_idx ON users (LOWER(email));")
        .execute(&mut *tx)
        .await?;

    // One code row per user
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS email_otps (
            user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            code VARCHAR(6),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Create refresh tokens table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token_hash VARCHAR(64) NOT NULL UNIQUE,
            expires_at TIMESTAMPTZ NOT NULL,
            issued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            revoked_at TIMESTAMPTZ,
            user_agent TEXT,
            ip_address VARCHAR(45)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);")
        .execute(&mut *tx)
        .await?;

    // Create bookings table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id BIGSERIAL PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title VARCHAR(200) NOT NULL,
            booking_date DATE NOT NULL,
            booking_time TIME NOT NULL,
            guests INTEGER NOT NULL CHECK (guests BETWEEN 1 AND 20),
            notes TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings(user_id, booking_date);")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Migrated pool for tests that need PostgreSQL. `None` (test skipped)
/// unless DATABASE_URL is set.
#[cfg(test)]
pub(crate) async fn test_pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    run_migrations(&pool).await.expect("migrations");
    Some(pool)
}

/// Insert a bare user row for tests
#[cfg(test)]
pub(crate) async fn insert_test_user(pool: &PgPool) -> uuid::Uuid {
    let name = format!("t_{}", &uuid::Uuid::new_v4().simple().to_string()[..16]);
    let (id,): (uuid::Uuid,) = sqlx::query_as(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, 'x') RETURNING id",
    )
    .bind(&name)
    .bind(format!("{}@example.com", name))
    .fetch_one(pool)
    .await
    .expect("insert user");
    id
}
