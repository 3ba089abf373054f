//! Access control middleware
//!
//! Two checks run before any handler: the peer address must be on a local or
//! overlay network (unless public peers are allowed), and when a token is
//! configured the caller must present it.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::ApiError;
use super::protocol::ErrorCode;
use super::routes::AppState;

/// Routes reachable without a token
const PUBLIC_PATHS: &[&str] = &["/"];

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Reject peers outside loopback, private and overlay ranges
pub async fn filter_peers(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.settings.allow_public_peers {
        return next.run(request).await;
    }

    // Absent when the router is driven without a socket (tests)
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    match peer {
        Some(addr) if !is_allowed_peer(addr.ip()) => {
            warn!("Rejected request from public peer {}", addr);
            ApiError::forbidden("Peer address not allowed").into_response()
        }
        _ => next.run(request).await,
    }
}

/// Require the configured token on every non-public route
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.settings.token.as_deref() else {
        return next.run(request).await;
    };

    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    match presented_token(&request) {
        None => {
            debug!("Missing token for {}", request.uri().path());
            ApiError::unauthorized(ErrorCode::AuthRequired, "Authentication required")
                .into_response()
        }
        Some(token) if token == expected => next.run(request).await,
        Some(_) => {
            warn!("Invalid token for {}", request.uri().path());
            ApiError::unauthorized(ErrorCode::AuthFailed, "Invalid token").into_response()
        }
    }
}

/// Token from `Authorization: Bearer ...`, else from the `token` query parameter
fn presented_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(query)| query.token)
    })
}

/// Whether a peer is on loopback, a private LAN, CGNAT/overlay or link-local
pub fn is_allowed_peer(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_allowed_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_allowed_v4(v4),
            None => is_allowed_v6(v6),
        },
    }
}

fn is_allowed_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    // 100.64.0.0/10
    let cgnat = octets[0] == 100 && (octets[1] & 0xC0) == 64;
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || cgnat
}

fn is_allowed_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7
    let unique_local = (first & 0xFE00) == 0xFC00;
    // fe80::/10
    let link_local = (first & 0xFFC0) == 0xFE80;
    ip.is_loopback() || unique_local || link_local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_allowed_ipv4_peers() {
        assert!(is_allowed_peer(ip("127.0.0.1")));
        assert!(is_allowed_peer(ip("10.1.2.3")));
        assert!(is_allowed_peer(ip("172.16.0.5")));
        assert!(is_allowed_peer(ip("192.168.1.20")));
        assert!(is_allowed_peer(ip("100.64.0.1")));
        assert!(is_allowed_peer(ip("100.127.255.254")));
        assert!(is_allowed_peer(ip("169.254.10.10")));
    }

    #[test]
    fn test_rejected_ipv4_peers() {
        assert!(!is_allowed_peer(ip("8.8.8.8")));
        assert!(!is_allowed_peer(ip("100.128.0.1")));
        assert!(!is_allowed_peer(ip("100.63.255.255")));
        assert!(!is_allowed_peer(ip("172.32.0.1")));
    }

    #[test]
    fn test_ipv6_peers() {
        assert!(is_allowed_peer(ip("::1")));
        assert!(is_allowed_peer(ip("fd7a:115c:a1e0::1")));
        assert!(is_allowed_peer(ip("fe80::1")));
        assert!(is_allowed_peer(ip("::ffff:192.168.0.1")));
        assert!(!is_allowed_peer(ip("2001:4860:4860::8888")));
        assert!(!is_allowed_peer(ip("::ffff:8.8.8.8")));
    }
}
