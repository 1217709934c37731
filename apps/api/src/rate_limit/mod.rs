//! Per-user sliding-window rate limiting, consulted before AI execution.
//!
//! `AppState` holds an `Arc<dyn RateLimiter>`: `RedisRateLimiter` when
//! `REDIS_URL` is configured, `DisabledRateLimiter` otherwise. Limiter
//! failures never block a request.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

const KEY_PREFIX: &str = "lazyprompt:ratelimit";

/// Sliding-window log over a sorted set scored by arrival time (ms).
/// Evicts expired entries, admits the request if under the limit, and
/// reports `{allowed, count, reset_ms}` atomically.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, 0, now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[4])
    count = count + 1
    allowed = 1
end
redis.call('PEXPIRE', key, window)

local reset = now + window
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    reset = tonumber(oldest[2]) + window
end
return {allowed, count, reset}
"#;

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

impl RateLimitResult {
    /// Result reported when the limiter cannot be consulted.
    pub fn fail_open() -> Self {
        Self {
            success: true,
            limit: 0,
            remaining: 0,
            reset: Utc::now(),
        }
    }

    fn from_script_reply(reply: &[i64], limit: u32) -> Option<Self> {
        let [allowed, count, reset_ms] = reply else {
            return None;
        };
        let used = u32::try_from(*count).unwrap_or(u32::MAX);
        Some(Self {
            success: *allowed == 1,
            limit,
            remaining: limit.saturating_sub(used),
            reset: Utc.timestamp_millis_opt(*reset_ms).single()?,
        })
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Infallible by contract: implementations fail open.
    async fn check(&self, identifier: &str) -> RateLimitResult;
}

pub struct RedisRateLimiter {
    client: redis::Client,
    /// Shared by all checks; emptied after an I/O failure so the next check reconnects.
    connection: Mutex<Option<MultiplexedConnection>>,
    requests: u32,
    window: Duration,
    script: redis::Script,
}

impl RedisRateLimiter {
    pub fn new(client: redis::Client, requests: u32, window: Duration) -> Self {
        Self {
            client,
            connection: Mutex::new(None),
            requests,
            window,
            script: redis::Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn try_check(&self, identifier: &str) -> Result<RateLimitResult, redis::RedisError> {
        let mut conn = self.connection().await?;
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);

        let reply: Vec<i64> = self
            .script
            .key(format!("{KEY_PREFIX}:{identifier}"))
            .arg(now_ms)
            .arg(window_ms)
            .arg(self.requests)
            .arg(Uuid::new_v4().to_string())
            .invoke_async(&mut conn)
            .await?;

        RateLimitResult::from_script_reply(&reply, self.requests).ok_or_else(|| {
            redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "unexpected rate limit script reply",
            ))
        })
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, identifier: &str) -> RateLimitResult {
        match self.try_check(identifier).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    self.connection.lock().await.take();
                }
                warn!(error = %e, "Rate limiting service unavailable, allowing request");
                RateLimitResult::fail_open()
            }
        }
    }
}

/// Used when no Redis is configured: every request is allowed.
pub struct DisabledRateLimiter;

#[async_trait]
impl RateLimiter for DisabledRateLimiter {
    async fn check(&self, _identifier: &str) -> RateLimitResult {
        RateLimitResult::fail_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_reply_admitted() {
        let result = RateLimitResult::from_script_reply(&[1, 2, 1_700_000_060_000], 5).unwrap();
        assert!(result.success);
        assert_eq!(result.limit, 5);
        assert_eq!(result.remaining, 3);
        assert_eq!(result.reset.timestamp_millis(), 1_700_000_060_000);
    }

    #[test]
    fn test_script_reply_refused_at_limit() {
        let result = RateLimitResult::from_script_reply(&[0, 5, 1_700_000_060_000], 5).unwrap();
        assert!(!result.success);
        assert_eq!(result.remaining, 0);
    }

    #[test]
    fn test_malformed_script_reply_is_rejected() {
        assert!(RateLimitResult::from_script_reply(&[1, 2], 5).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_open() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let limiter = RedisRateLimiter::new(client, 5, Duration::from_secs(60));

        let result = limiter.check("user-1").await;
        assert!(result.success);
        assert_eq!(result.limit, 0);
    }

    #[tokio::test]
    async fn test_failed_connection_is_not_kept() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let limiter = RedisRateLimiter::new(client, 5, Duration::from_secs(60));

        assert!(limiter.connection().await.is_err());
        assert!(limiter.connection.lock().await.is_none());
        assert!(limiter.check("user-1").await.success);
        assert!(limiter.connection.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_allows() {
        for _ in 0..10 {
            assert!(DisabledRateLimiter.check("user-1").await.success);
        }
    }
}
