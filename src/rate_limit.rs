//! Fixed-window request limiting per client.
//!
//! The first request from a client opens a window of `window` length with
//! `count = 1`; later requests in the same window increment the count
//! until it reaches `max_requests`, after which requests are rejected with
//! 429 until the window resets. Counters live behind [`RateLimitStore`] so a
//! shared store can replace the process-local one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, rate_limited};
use crate::server::AppState;
use crate::telemetry::METRIC_RATE_LIMITED;

pub const UNKNOWN_CLIENT: &str = "unknown";

/// Counter state of one client's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub count: u32,
    pub reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub allowed: bool,
    pub entry: WindowEntry,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records one request from `key` atomically. A full window is not
    /// incremented.
    async fn hit(&self, key: &str, now: Instant, window: Duration, max_requests: u32) -> Hit;

    /// Drops windows that ended at or before `now`. Returns how many.
    async fn purge_expired(&self, now: Instant) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
}

#[cfg(test)]
impl InMemoryRateLimitStore {
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, now: Instant, window: Duration, max_requests: u32) -> Hit {
        let mut entries = self.entries.lock().await;

        match entries.get_mut(key) {
            Some(entry) if now < entry.reset_at => {
                if entry.count >= max_requests {
                    return Hit {
                        allowed: false,
                        entry: *entry,
                    };
                }
                entry.count += 1;
                Hit {
                    allowed: true,
                    entry: *entry,
                }
            }
            _ => {
                let entry = WindowEntry {
                    count: 1,
                    reset_at: now + window,
                };
                entries.insert(key.to_string(), entry);
                Hit {
                    allowed: true,
                    entry,
                }
            }
        }
    }

    async fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.reset_at > now);
        before - entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Whole seconds until the window resets, rounded up.
    pub retry_after: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    pub fn in_memory(max_requests: u32, window: Duration) -> Self {
        Self::new(
            Arc::new(InMemoryRateLimitStore::default()),
            max_requests,
            window,
        )
    }

    pub async fn check(&self, client: &str, now: Instant) -> Decision {
        let hit = self
            .store
            .hit(client, now, self.window, self.max_requests)
            .await;
        let until_reset = hit.entry.reset_at.saturating_duration_since(now);
        let mut retry_after = until_reset.as_secs();
        if until_reset.subsec_nanos() > 0 {
            retry_after += 1;
        }

        Decision {
            allowed: hit.allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(hit.entry.count),
            retry_after,
        }
    }

    /// Purges expired windows once per window length until `shutdown` fires.
    pub async fn run_sweeper(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.window);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("rate limit sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    let purged = self.store.purge_expired(Instant::now()).await;
                    tracing::debug!(purged, "purged expired rate limit windows");
                }
            }
        }
    }
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, else `"unknown"`.
///
/// Requests without proxy headers share the `"unknown"` bucket.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_identifier(request.headers());
    let decision = state.rate_limiter.check(&client, Instant::now()).await;

    if !decision.allowed {
        counter!(METRIC_RATE_LIMITED).increment(1);
        tracing::warn!(client = %client, retry_after = decision.retry_after, "rate limit exceeded");
        return Err(rate_limited(decision.retry_after));
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    Ok(response)
}
