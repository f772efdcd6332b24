//! Per-client request limiting

use super::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;

/// Idle client entries are dropped once the table grows past this size
const RETAIN_THRESHOLD: usize = 4096;

type KeyedLimiter = governor::RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Allows `limit` requests per client IP per minute
pub struct RateLimiter {
    limit: NonZeroU32,
    inner: KeyedLimiter,
}

impl RateLimiter {
    /// `None` when `limit` is 0 (limiting disabled)
    pub fn per_minute(limit: u32) -> Option<Self> {
        let limit = NonZeroU32::new(limit)?;
        Some(RateLimiter {
            limit,
            inner: KeyedLimiter::keyed(Quota::per_minute(limit)),
        })
    }

    /// Count a request from `ip`; false once the client is over its limit
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.inner.len() > RETAIN_THRESHOLD {
            self.inner.retain_recent();
        }
        self.inner.check_key(&ip).is_ok()
    }
}

/// Rate limiting middleware. Requests without peer information pass through.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = &state.rate_limiter else {
        return next.run(request).await;
    };

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());

    match client {
        Some(ip) if !limiter.check(ip) => {
            tracing::warn!("Rate limit exceeded for {}", ip);
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": format!("Rate limit exceeded: {} per 1 minute", limiter.limit)
                })),
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}
