//! # API Guard
//!
//! Static API-key check and a fixed-window rate limiter for `/api` routes.
//! The key check runs first, so unauthenticated callers never consume quota.
//! Quota is counted per presented API key; forwarded-for headers are
//! client-controlled and never used as the limiter key.

use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Header carrying the shared API key
pub const API_KEY_HEADER: &str = "x-api-key";

pub const DEFAULT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by API key
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: DashMap::new(),
        }
    }

    /// Count a request for `key`. On rejection returns seconds until the window resets.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.duration_since(entry.started);
            return Err(self.window.saturating_sub(elapsed).as_secs().max(1));
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop windows that have expired
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

/// Reject requests without the configured `x-api-key`
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let expected = state.config.api_key.as_str();
    match presented {
        Some(key) if !expected.is_empty() && key == expected => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected request with missing or wrong API key");
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Forbidden" })),
            )
                .into_response()
        }
    }
}

/// Apply the per-client request quota
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = quota_key(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
    );

    match state.limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(path = %request.uri().path(), retry_after, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(serde_json::json!({
                    "error": "Too many requests, please try again later."
                })),
            )
                .into_response()
        }
    }
}

/// Presented API key, else the peer address
fn quota_key(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| format!("key:{}", v))
        .or_else(|| peer.map(|ConnectInfo(addr)| format!("ip:{}", addr.ip())))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limits_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
        let retry_after = limiter.check("10.0.0.1").unwrap_err();
        assert_eq!(retry_after, 60);

        // Other clients have their own window
        assert!(limiter.check("10.0.0.2").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(limiter.check("a").unwrap_err(), 15);

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(limiter.check("a").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_expired_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        limiter.check("a").unwrap();
        limiter.check("b").unwrap();
        assert_eq!(limiter.tracked_clients(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_quota_key_uses_api_key_and_ignores_forwarded_for() {
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)));

        let mut first = HeaderMap::new();
        first.insert(API_KEY_HEADER, "k1".parse().unwrap());
        first.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        let mut second = HeaderMap::new();
        second.insert(API_KEY_HEADER, "k1".parse().unwrap());
        second.insert("x-forwarded-for", "198.51.100.9".parse().unwrap());

        assert_eq!(quota_key(&first, Some(&peer)), "key:k1");
        assert_eq!(quota_key(&first, None), quota_key(&second, None));

        let mut forwarded_only = HeaderMap::new();
        forwarded_only.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        assert_eq!(quota_key(&forwarded_only, Some(&peer)), "ip:127.0.0.1");
        assert_eq!(quota_key(&HeaderMap::new(), None), "unknown");
    }
}
