//! Per-client rate limiting.
//!
//! Each (client IP, tier) pair owns a bucket that refills linearly over the
//! window. The login and code-verification tiers are much tighter than the
//! general tier since both are brute-force targets.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::error::ApiError;
use crate::config::RateLimitConfig;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    /// Menu and panel endpoints
    Api,
    /// Username/password submissions
    Login,
    /// Login code submissions
    VerifyLogin,
    /// Token refresh
    Refresh,
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    window_start: Instant,
    last_request: Instant,
}

impl Bucket {
    fn full(max_tokens: u32, now: Instant) -> Self {
        Self {
            tokens: max_tokens,
            window_start: now,
            last_request: now,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<(IpAddr, RateLimitTier), Bucket>,
    config: RateLimitConfig,
    window: Duration,
}

/// Limit state reported back to the client
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub limit: u32,
    pub reset_after: u64,
}

/// Why a request was refused
#[derive(Debug, Clone, Copy)]
pub struct RateLimited {
    pub limit: u32,
    pub retry_after: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            window: Duration::from_secs(config.window_seconds),
            config,
        }
    }

    pub fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Login => self.config.login_requests_per_window,
            RateLimitTier::VerifyLogin => self.config.verify_login_requests_per_window,
            RateLimitTier::Refresh => self.config.refresh_requests_per_window,
        }
    }

    /// Consume one token for the client, or report when to retry.
    pub fn check(&self, ip: IpAddr, tier: RateLimitTier) -> Result<RateLimitInfo, RateLimited> {
        if !self.config.enabled {
            return Ok(RateLimitInfo {
                remaining: u32::MAX,
                limit: u32::MAX,
                reset_after: 0,
            });
        }

        let limit = self.limit_for(tier);
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry((ip, tier))
            .or_insert_with(|| Bucket::full(limit, now));

        let elapsed = now.duration_since(bucket.window_start);
        if elapsed >= self.window {
            bucket.tokens = limit;
            bucket.window_start = now;
        } else {
            let since_last = now.duration_since(bucket.last_request);
            let rate = limit as f64 / self.window.as_secs_f64();
            let refill = (since_last.as_secs_f64() * rate) as u32;
            bucket.tokens = bucket.tokens.saturating_add(refill).min(limit);
        }
        bucket.last_request = now;

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(bucket.window_start))
            .as_secs();
        if bucket.tokens == 0 {
            return Err(RateLimited {
                limit,
                retry_after: reset_after.max(1),
            });
        }
        bucket.tokens -= 1;
        Ok(RateLimitInfo {
            remaining: bucket.tokens,
            limit,
            reset_after,
        })
    }

    /// Drop buckets idle for more than two windows
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let expiry = self.window * 2;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_request) < expiry);
    }

    pub fn entry_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Client IP from proxy headers, falling back to loopback
fn client_ip(headers: &HeaderMap) -> IpAddr {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_after: u64) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_after));
}

async fn limit_tier(
    state: Arc<AppState>,
    request: Request<Body>,
    next: Next,
    tier: RateLimitTier,
) -> Response {
    let ip = client_ip(request.headers());

    match state.rate_limiter.check(ip, tier) {
        Ok(info) => {
            let mut response = next.run(request).await;
            set_limit_headers(response.headers_mut(), info.limit, info.remaining, info.reset_after);
            response
        }
        Err(limited) => {
            tracing::warn!(ip = %ip, tier = ?tier, "Rate limit exceeded");
            let mut response = ApiError::rate_limited(format!(
                "Rate limit exceeded. Try again in {} seconds.",
                limited.retry_after
            ))
            .into_response();
            let headers = response.headers_mut();
            headers.insert("Retry-After", HeaderValue::from(limited.retry_after));
            set_limit_headers(headers, limited.limit, 0, limited.retry_after);
            response
        }
    }
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(state, request, next, RateLimitTier::Api).await
}

pub async fn rate_limit_login(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(state, request, next, RateLimitTier::Login).await
}

pub async fn rate_limit_verify_login(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(state, request, next, RateLimitTier::VerifyLogin).await
}

pub async fn rate_limit_refresh(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    limit_tier(state, request, next, RateLimitTier::Refresh).await
}

/// Spawn a background task that purges idle buckets
pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, cleanup_interval_secs: u64) {
    if cleanup_interval_secs == 0 {
        return;
    }
    tokio::spawn(async move {
        let interval = Duration::from_secs(cleanup_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            rate_limiter.cleanup_expired();
            tracing::debug!(
                entries = rate_limiter.entry_count(),
                "Rate limiter cleanup complete"
            );
        }
    });
}
