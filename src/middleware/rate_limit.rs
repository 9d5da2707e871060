//! Rate Limiting Middleware
//!
//! Fixed-window request budgets keyed by client address. Each protected
//! route gets its own `RateLimiter` instance. The address is the socket
//! peer; forwarding headers count only behind a trusted proxy.

use crate::extractors::client_ip;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Result of charging one request against a client's budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// In-memory fixed-window limiter
pub struct RateLimiter {
    name: &'static str,
    max_requests: u32,
    window: Duration,
    requests: Mutex<HashMap<String, (u32, Instant)>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, max_requests: u32, window: Duration) -> Self {
        Self {
            name,
            max_requests,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Charge one request for `client_id`
    pub async fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, Instant::now()).await
    }

    async fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        let mut requests = self.requests.lock().await;

        let (count, window_start) = requests
            .entry(client_id.to_string())
            .or_insert((0, now));

        // Reset if window expired
        if now.duration_since(*window_start) >= self.window {
            *count = 0;
            *window_start = now;
        }

        if *count >= self.max_requests {
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(*window_start));
            return RateLimitDecision::Limited { retry_after };
        }

        *count += 1;
        RateLimitDecision::Allowed {
            remaining: self.max_requests - *count,
        }
    }

    /// Drop windows that have ended
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut requests = self.requests.lock().await;
        let before = requests.len();
        requests.retain(|_, (_, start)| now.duration_since(*start) < self.window);
        before - requests.len()
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.requests.lock().await.len()
    }
}

/// Periodically purge stale windows from the given limiters
pub fn spawn_purge_task(limiters: Vec<Arc<RateLimiter>>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            for limiter in &limiters {
                let purged = limiter.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(limiter = limiter.name, purged, "Purged rate limit windows");
                }
            }
        }
    })
}

/// Rate limiting middleware
pub async fn rate_limiter(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let client_id = client_ip(req.headers(), req.extensions())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let remaining = match limiter.check(&client_id).await {
        RateLimitDecision::Allowed { remaining } => remaining,
        RateLimitDecision::Limited { retry_after } => {
            // Round up so clients never retry a moment too early
            let retry_after = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);

            tracing::warn!(
                limiter = limiter.name,
                client = %client_id,
                retry_after,
                "Rate limit exceeded"
            );

            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(serde_json::json!({
                    "error": "rate_limited",
                    "message": "Too many requests. Please try again later.",
                    "retry_after": retry_after
                })),
            )
                .into_response());
        }
    };

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", limiter.max_requests.into());
    headers.insert("X-RateLimit-Remaining", remaining.into());

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_is_per_client() {
        let limiter = RateLimiter::new("login", 5, Duration::from_secs(60));
        let now = Instant::now();

        tokio_test::block_on(async {
            for expected in (0..5).rev() {
                assert_eq!(
                    limiter.check_at("203.0.113.1", now).await,
                    RateLimitDecision::Allowed {
                        remaining: expected
                    }
                );
            }

            assert!(matches!(
                limiter.check_at("203.0.113.1", now).await,
                RateLimitDecision::Limited { .. }
            ));

            // A different address has its own budget
            assert_eq!(
                limiter.check_at("203.0.113.2", now).await,
                RateLimitDecision::Allowed { remaining: 4 }
            );
        });
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new("mfa", 3, Duration::from_secs(60));
        let start = Instant::now();

        tokio_test::block_on(async {
            for _ in 0..3 {
                limiter.check_at("client", start).await;
            }

            match limiter.check_at("client", start + Duration::from_secs(20)).await {
                RateLimitDecision::Limited { retry_after } => {
                    assert_eq!(retry_after, Duration::from_secs(40));
                }
                other => panic!("expected limit, got {:?}", other),
            }

            assert_eq!(
                limiter
                    .check_at("client", start + Duration::from_secs(60))
                    .await,
                RateLimitDecision::Allowed { remaining: 2 }
            );
        });
    }

    #[tokio::test]
    async fn test_purge_drops_only_expired_windows() {
        let limiter = RateLimiter::new("login", 5, Duration::from_secs(60));
        let now = Instant::now();

        limiter.check_at("fresh", now).await;
        if let Some(old) = now.checked_sub(Duration::from_secs(120)) {
            limiter.check_at("stale", old).await;
            assert_eq!(limiter.tracked_clients().await, 2);
            assert_eq!(limiter.purge_expired().await, 1);
        }

        assert_eq!(limiter.tracked_clients().await, 1);
    }
}
