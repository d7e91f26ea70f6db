//! Fixed-window rate limiting for the proxy endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::http::response::ProxyError;
use crate::observability::metrics;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Per-client counter for the current window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitWindow {
    pub count: u32,
    pub window_start: Instant,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Shared fixed-window limiter.
///
/// Each window entry is read-modify-written under its DashMap shard lock, so
/// concurrent handlers cannot lose an increment.
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    enabled: bool,
    max_requests: u32,
    window: Duration,
    trust_forwarded_for: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            enabled: config.enabled,
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    /// Count a request from `client` now.
    pub fn check(&self, client: &str) -> RateLimitDecision {
        self.check_at(client, Instant::now())
    }

    /// Count a request from `client` at `now`.
    pub fn check_at(&self, client: &str, now: Instant) -> RateLimitDecision {
        let mut entry = self
            .windows
            .entry(client.to_string())
            .or_insert_with(|| RateLimitWindow {
                count: 0,
                window_start: now,
            });

        let elapsed = now.duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            RateLimitDecision::Allowed {
                remaining: self.max_requests - entry.count,
            }
        } else {
            RateLimitDecision::Limited {
                retry_after: self.window.saturating_sub(now.duration_since(entry.window_start)),
            }
        }
    }

    /// Drop windows that have expired. Returns the number removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.window_start) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Resolve the identity a request is counted against.
    pub fn client_identity(&self, request: &Request<Body>) -> String {
        if self.trust_forwarded_for {
            let forwarded = request
                .headers()
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Periodically purge expired windows until shutdown.
    pub async fn run_purge(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired(Instant::now());
                    if removed > 0 {
                        tracing::debug!(
                            removed_entries = removed,
                            remaining_entries = self.tracked_clients(),
                            "Rate limiter cleanup completed"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limiter purge task exiting");
                    break;
                }
            }
        }
    }
}

/// Middleware applied to the proxy route only.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = limiter.client_identity(&request);
    match limiter.check(&client) {
        RateLimitDecision::Allowed { .. } => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => {
            tracing::warn!(client = %client, "Rate limit exceeded");
            metrics::record_rate_limited();
            ProxyError::RateLimited { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            max_requests,
            window_secs,
            cleanup_interval_secs: 60,
            trust_forwarded_for: false,
        })
    }

    #[test]
    fn test_limit_then_reset_after_window() {
        let limiter = limiter(100, 60);
        let start = Instant::now();

        for i in 0..100 {
            assert!(
                limiter.check_at("10.0.0.1", start).is_allowed(),
                "request {} should be allowed",
                i + 1
            );
        }
        assert!(!limiter.check_at("10.0.0.1", start).is_allowed());

        let later = start + Duration::from_secs(60);
        assert_eq!(
            limiter.check_at("10.0.0.1", later),
            RateLimitDecision::Allowed { remaining: 99 }
        );
    }

    #[test]
    fn test_rejections_do_not_grow_counter() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_allowed());
        for _ in 0..5 {
            assert!(!limiter.check_at("a", now).is_allowed());
        }
        assert_eq!(limiter.windows.get("a").unwrap().count, 1);
    }

    #[test]
    fn test_retry_after_counts_down() {
        let limiter = limiter(1, 60);
        let start = Instant::now();
        limiter.check_at("a", start);
        match limiter.check_at("a", start + Duration::from_secs(15)) {
            RateLimitDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(45))
            }
            other => panic!("expected limited, got {:?}", other),
        }
    }

    #[test]
    fn test_clients_independent() {
        let limiter = limiter(2, 60);
        let now = Instant::now();
        assert!(limiter.check_at("::1", now).is_allowed());
        assert!(limiter.check_at("::1", now).is_allowed());
        assert!(!limiter.check_at("::1", now).is_allowed());
        assert!(limiter.check_at("2001:db8::1", now).is_allowed());
    }

    #[test]
    fn test_purge_expired() {
        let limiter = limiter(5, 10);
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("new", start + Duration::from_secs(8));

        let removed = limiter.purge_expired(start + Duration::from_secs(12));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert!(limiter.windows.contains_key("new"));
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(limiter(50, 60));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_at("shared", now).is_allowed())
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_client_identity() {
        let mut config = RateLimitConfig::default();
        let plain = RateLimiter::new(&config);
        config.trust_forwarded_for = true;
        let trusting = RateLimiter::new(&config);

        let mut request = Request::builder()
            .header(X_FORWARDED_FOR, "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.1:5000".parse::<SocketAddr>().unwrap()));

        assert_eq!(plain.client_identity(&request), "192.0.2.1");
        assert_eq!(trusting.client_identity(&request), "203.0.113.7");
    }
}
