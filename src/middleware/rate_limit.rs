//! Sliding-window limiter for the login form and the event webhook.
use crate::error::ApiError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window_secs: u64) -> Self {
        Self {
            hits: Arc::new(RwLock::new(HashMap::new())),
            limit,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records a hit for `key`. When the window is full, returns how long
    /// until the oldest hit expires.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let queue = hits.entry(key.to_string()).or_default();

        while queue.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            queue.pop_front();
        }

        if queue.len() >= self.limit {
            let oldest = queue.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }
        queue.push_back(now);
        Ok(())
    }

    /// Drops expired hits and forgets idle keys. Returns the number of keys removed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let before = hits.len();

        hits.retain(|_, queue| {
            queue.retain(|t| now.duration_since(*t) < self.window);
            !queue.is_empty()
        });

        let removed = before - hits.len();
        tracing::debug!("Rate limiter cleanup: {} keys removed, {} active", removed, hits.len());
        removed
    }
}

/// Limits by client IP. Needs `into_make_service_with_connect_info`.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip().to_string();

    if let Err(retry_after) = limiter.check(&ip).await {
        tracing::warn!("Rate limit exceeded for IP: {}", ip);
        let mut response = ApiError::TooManyRequests.into_response();
        let secs = retry_after.as_secs().max(1);
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}
