//! Rate limiting. A process-local keyed counter guarding the token/authorize/revoke
//! endpoints: key is the caller's forwarded IP (first entry of `X-Forwarded-For`, per the
//! resolved redesign note) or, once a client has been authenticated, its client_id.
//!
//! Two implementations share one trait so the in-memory variant can stand in for the
//! repository-backed one under `DISABLE_RATE_LIMITING`, keeping tests off wall-clock windows
//! and a live database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::MySqlPool;
use tokio::sync::Mutex;

use crate::error::OAuthError;
use crate::repositories::RateLimitRepository;

/// Default window applied to the token/authorize/revoke endpoints: 60 requests per minute
/// per identifier. Handlers may pass a narrower limit for more sensitive endpoints.
pub const DEFAULT_MAX_REQUESTS: i32 = 60;
pub const DEFAULT_WINDOW_SECONDS: i64 = 60;

#[async_trait]
pub trait RateLimiterStore: Send + Sync {
    /// Increment the counter for `(identifier, endpoint)` and fail with
    /// `OAuthError::TemporarilyUnavailable` once `max_requests` is exceeded within
    /// `window_seconds`.
    async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        max_requests: i32,
        window_seconds: i64,
    ) -> Result<(), OAuthError>;
}

struct Window {
    count: i32,
    started_at: chrono::DateTime<Utc>,
}

/// Deterministic in-memory limiter selected when `DISABLE_RATE_LIMITING` is set. Holds its
/// counters for the lifetime of the process; never touches the database.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self { windows: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl RateLimiterStore for InMemoryRateLimiter {
    async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        max_requests: i32,
        window_seconds: i64,
    ) -> Result<(), OAuthError> {
        let key = (identifier.to_string(), endpoint.to_string());
        let mut windows = self.windows.lock().await;
        let now = Utc::now();

        let window = windows.entry(key).or_insert_with(|| Window { count: 0, started_at: now });
        if (now - window.started_at).num_seconds() >= window_seconds {
            window.count = 0;
            window.started_at = now;
        }
        window.count += 1;

        if window.count > max_requests {
            return Err(OAuthError::TemporarilyUnavailable);
        }
        Ok(())
    }
}

/// Production limiter, window-counter semantics persisted via `RateLimitRepository` so the
/// limit is shared across server instances.
pub struct RepositoryRateLimiter {
    repo: RateLimitRepository,
}

impl RepositoryRateLimiter {
    pub fn new(pool: MySqlPool) -> Self {
        Self { repo: RateLimitRepository::new(pool) }
    }
}

#[async_trait]
impl RateLimiterStore for RepositoryRateLimiter {
    async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        max_requests: i32,
        window_seconds: i64,
    ) -> Result<(), OAuthError> {
        let count = self.repo.increment(identifier, endpoint, window_seconds).await?;
        if count > max_requests {
            return Err(OAuthError::TemporarilyUnavailable);
        }
        Ok(())
    }
}

/// Pulls the first entry out of a comma-separated `X-Forwarded-For` value; falls back to
/// the direct peer address when the header is absent.
pub fn client_identifier(forwarded_for: Option<&str>, peer_addr: &str) -> String {
    match forwarded_for.and_then(|v| v.split(',').next()) {
        Some(first) if !first.trim().is_empty() => first.trim().to_string(),
        _ => peer_addr.to_string(),
    }
}

pub type SharedRateLimiter = Arc<dyn RateLimiterStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_limiter_allows_up_to_max_requests() {
        let limiter = InMemoryRateLimiter::new();
        for _ in 0..5 {
            limiter.check("1.2.3.4", "token", 5, 60).await.unwrap();
        }
        let err = limiter.check("1.2.3.4", "token", 5, 60).await.unwrap_err();
        assert!(matches!(err, OAuthError::TemporarilyUnavailable));
    }

    #[tokio::test]
    async fn in_memory_limiter_tracks_endpoints_independently() {
        let limiter = InMemoryRateLimiter::new();
        limiter.check("1.2.3.4", "token", 1, 60).await.unwrap();
        limiter.check("1.2.3.4", "authorize", 1, 60).await.unwrap();
    }

    #[test]
    fn client_identifier_takes_first_forwarded_entry() {
        assert_eq!(client_identifier(Some("10.0.0.1, 10.0.0.2"), "127.0.0.1"), "10.0.0.1");
        assert_eq!(client_identifier(None, "127.0.0.1"), "127.0.0.1");
        assert_eq!(client_identifier(Some(""), "127.0.0.1"), "127.0.0.1");
    }
}
