//! Request Extractors
//!
//! Axum extractors for the authenticated user and request metadata.

use crate::accounts::models::AccessTokenClaims;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated user information extracted from JWT claims
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
}

impl AuthUser {
    /// Create user from JWT claims
    pub fn from_claims(claims: &AccessTokenClaims) -> Self {
        Self { id: claims.sub }
    }
}

/// Claims are placed in request extensions by `middleware::auth::require_auth`
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessTokenClaims>()
            .map(AuthUser::from_claims)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "error": "unauthorized",
                        "message": "Authentication required"
                    })),
                )
                    .into_response()
            })
    }
}

/// Proxies whose forwarding headers are believed (from TRUSTED_PROXIES)
///
/// Installed as a request extension by `App::routes`. Without it, or when
/// the socket peer is not listed, the peer address is the client address.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies(Arc<Vec<IpAddr>>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(Arc::new(proxies))
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    /// Client address for a request arriving from `peer`
    ///
    /// Forwarding headers only count when `peer` is a trusted proxy.
    /// `X-Forwarded-For` is walked from the right; the first hop that is not
    /// itself a trusted proxy is the client.
    pub fn resolve(&self, headers: &HeaderMap, peer: IpAddr) -> IpAddr {
        if !self.contains(&peer) {
            return peer;
        }

        if let Some(forwarded) = headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
        {
            let mut nearest = peer;
            for hop in forwarded.rsplit(',') {
                let Ok(ip) = hop.trim().parse::<IpAddr>() else {
                    return nearest;
                };
                if !self.contains(&ip) {
                    return ip;
                }
                nearest = ip;
            }
        }

        headers
            .get("X-Real-IP")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(peer)
    }
}

/// Client address of a request, from the `ConnectInfo` peer and the
/// `TrustedProxies` extension. `None` when the connection info is missing.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;

    Some(match extensions.get::<TrustedProxies>() {
        Some(proxies) => proxies.resolve(headers, peer),
        None => peer,
    })
}

/// Client information (IP, user agent)
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = client_ip(&parts.headers, &parts.extensions).map(|ip| ip.to_string());

        let user_agent = parts
            .headers
            .get("User-Agent")
            .and_then(|h| h.to_str().ok())
            .map(String::from);

        Ok(ClientInfo { ip, user_agent })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static(value));
        headers
    }

    fn extensions(peer: &str, proxies: Option<TrustedProxies>) -> Extensions {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::new(ip(peer), 51000)));
        if let Some(proxies) = proxies {
            extensions.insert(proxies);
        }
        extensions
    }

    #[test]
    fn test_headers_ignored_without_trusted_proxies() {
        let mut headers = forwarded("203.0.113.7");
        headers.insert("X-Real-IP", HeaderValue::from_static("203.0.113.8"));

        assert_eq!(
            client_ip(&headers, &extensions("192.0.2.10", None)),
            Some(ip("192.0.2.10"))
        );
        assert_eq!(
            client_ip(&headers, &extensions("192.0.2.10", Some(TrustedProxies::default()))),
            Some(ip("192.0.2.10"))
        );
    }

    #[test]
    fn test_headers_ignored_from_untrusted_peer() {
        let proxies = TrustedProxies::new(vec![ip("10.0.0.1")]);
        assert_eq!(
            proxies.resolve(&forwarded("203.0.113.7"), ip("192.0.2.10")),
            ip("192.0.2.10")
        );
    }

    #[test]
    fn test_trusted_proxy_chain_resolves_rightmost_untrusted_hop() {
        let proxies = TrustedProxies::new(vec![ip("10.0.0.1"), ip("10.0.0.2")]);

        // The leftmost entry is client-controlled and must not win
        let headers = forwarded("6.6.6.6, 203.0.113.7, 10.0.0.2");
        assert_eq!(proxies.resolve(&headers, ip("10.0.0.1")), ip("203.0.113.7"));
    }

    #[test]
    fn test_trusted_proxy_falls_back_to_real_ip_then_peer() {
        let proxies = TrustedProxies::new(vec![ip("10.0.0.1")]);

        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(proxies.resolve(&headers, ip("10.0.0.1")), ip("198.51.100.4"));

        assert_eq!(proxies.resolve(&HeaderMap::new(), ip("10.0.0.1")), ip("10.0.0.1"));
        assert_eq!(
            proxies.resolve(&forwarded("not-an-ip"), ip("10.0.0.1")),
            ip("10.0.0.1")
        );
    }

    #[test]
    fn test_missing_connect_info() {
        assert_eq!(client_ip(&forwarded("203.0.113.7"), &Extensions::new()), None);
    }
}
