//! Fixed-window rate limiting per client IP.
//!
//! Each client address gets `max_requests` per `window`. The counter resets
//! when the window that started with the client's first request elapses.
//! Exhausted clients receive 429 `RATE_LIMITED` with `Retry-After`.

use crate::error::ErrorResponse;
use crate::extractors::client_ip;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Key clients on `X-Forwarded-For`/`X-Real-IP`; only safe behind a
    /// proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 300,
            window: Duration::from_secs(15 * 60),
            trust_proxy_headers: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within budget; requests left in the window.
    Allowed {
        /// Remaining requests.
        remaining: u32,
    },
    /// Over budget until the window resets.
    Limited {
        /// Time until the window resets.
        retry_after: Duration,
    },
}

/// Shared limiter state.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Configured budget.
    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts one request from `ip`.
    pub async fn check(&self, ip: IpAddr) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.config.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.config.max_requests {
            let elapsed = now.duration_since(window.started);
            return Decision::Limited {
                retry_after: self.config.window.saturating_sub(elapsed),
            };
        }
        window.count += 1;
        Decision::Allowed {
            remaining: self.config.max_requests - window.count,
        }
    }

    /// Drops windows that have fully elapsed.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.windows
            .lock()
            .await
            .retain(|_, w| now.duration_since(w.started) < window);
    }

    /// Spawns a task that calls [`cleanup`](Self::cleanup) once per window.
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.config.window);
            loop {
                ticker.tick().await;
                limiter.cleanup().await;
            }
        })
    }
}

/// Rejection for an exhausted client.
#[derive(Debug)]
pub struct RateLimitError {
    /// Time until the window resets.
    pub retry_after: Duration,
    /// Requests allowed per window.
    pub limit: u32,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let seconds = self.retry_after.as_secs().max(1);
        let body = ErrorResponse {
            code: "RATE_LIMITED",
            message: format!("Too many requests. Retry after {seconds} seconds"),
            details: None,
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(http::header::RETRY_AFTER, HeaderValue::from(seconds));
        headers.insert(LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
        response
    }
}

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Rate limit middleware for `axum::middleware::from_fn_with_state`.
///
/// # Errors
///
/// Returns [`RateLimitError`] when the client's window is exhausted.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let ip = client_ip(
        request.headers(),
        connect_info.as_ref(),
        limiter.config.trust_proxy_headers,
    );

    match limiter.check(ip).await {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.config.max_requests));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            Ok(response)
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client_ip = %ip, "Rate limit exceeded");
            Err(RateLimitError {
                retry_after,
                limit: limiter.config.max_requests,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            ..RateLimitConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn budget_is_per_ip_and_resets_with_the_window() {
        let limiter = limiter(2);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert_eq!(limiter.check(a).await, Decision::Allowed { remaining: 1 });
        assert_eq!(limiter.check(a).await, Decision::Allowed { remaining: 0 });
        assert!(matches!(limiter.check(a).await, Decision::Limited { .. }));
        assert_eq!(limiter.check(b).await, Decision::Allowed { remaining: 1 });

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.check(a).await, Decision::Allowed { remaining: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_counts_down_and_cleanup_forgets_old_windows() {
        let limiter = limiter(1);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        limiter.check(ip).await;

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(
            limiter.check(ip).await,
            Decision::Limited {
                retry_after: Duration::from_secs(40)
            }
        );

        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.cleanup().await;
        assert!(limiter.windows.lock().await.is_empty());
    }
}
