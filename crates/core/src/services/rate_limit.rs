//! Sliding-window rate limiting for post creation.
//!
//! Admission is decided per author over a rolling window: an attempt at `T`
//! is counted against every accepted attempt in `(T - window, T]`. Rejected
//! attempts are never recorded.
//!
//! Window state lives behind [`SlidingWindowStore`]. Each store performs the
//! prune / decide / record sequence atomically per key:
//!
//! - [`InMemorySlidingWindow`] for single-instance deployments and tests
//! - [`RedisSlidingWindow`] for deployments sharing one Redis

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chirp_common::{AppError, AppResult, IdGenerator, config::RateLimitSettings};
use fred::clients::Client as RedisClient;
use fred::interfaces::LuaInterface;
use tokio::sync::Mutex;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum accepted attempts per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Create a new rate limit config.
    #[must_use]
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self::new(settings.max_posts, settings.window_secs)
    }
}

/// Default limits.
pub mod limits {
    use super::RateLimitConfig;

    /// Post creation: 3 posts per author per rolling minute.
    pub const POST_CREATE: RateLimitConfig = RateLimitConfig::new(3, 60);
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the attempt was admitted (and recorded).
    pub allowed: bool,
    /// Attempts still available in the current window.
    pub remaining: u32,
    /// Time until the oldest counted attempt leaves the window. Zero when allowed.
    pub retry_after: Duration,
}

impl RateLimitDecision {
    const fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    const fn limited(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }

    /// `retry_after` rounded up to whole seconds, at least one.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let rounded = if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        rounded.max(1)
    }
}

/// Keyed sliding-window counter store.
#[async_trait]
pub trait SlidingWindowStore: Send + Sync {
    /// Prune expired entries for `key`, then admit and record the attempt iff
    /// fewer than `config.max_requests` remain. Must be atomic per key.
    async fn try_acquire(&self, key: &str, config: &RateLimitConfig)
    -> AppResult<RateLimitDecision>;
}

/// Source of monotonic time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// System clock implementation using `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Process-local sliding-window log.
#[derive(Debug, Clone)]
pub struct InMemorySlidingWindow {
    clock: Arc<dyn Clock>,
    windows: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl Default for InMemorySlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySlidingWindow {
    /// Create a store driven by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by the given clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drop keys whose entries are all older than `window`.
    pub async fn cleanup(&self, window: Duration) {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, log| {
            prune(log, now, window);
            !log.is_empty()
        });
    }

    /// Get the number of tracked keys.
    pub async fn key_count(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Remove entries at or before `now - window`.
fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = log.front() {
        if now.saturating_duration_since(oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

#[async_trait]
impl SlidingWindowStore for InMemorySlidingWindow {
    async fn try_acquire(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> AppResult<RateLimitDecision> {
        // The lock spans prune, decide and record.
        let mut windows = self.windows.lock().await;
        let now = self.clock.now();
        let log = windows.entry(key.to_string()).or_default();

        prune(log, now, config.window);

        let used = u32::try_from(log.len()).unwrap_or(u32::MAX);
        if used < config.max_requests {
            log.push_back(now);
            return Ok(RateLimitDecision::allowed(config.max_requests - used - 1));
        }

        let retry_after = log.front().map_or(config.window, |&oldest| {
            config
                .window
                .saturating_sub(now.saturating_duration_since(oldest))
        });
        Ok(RateLimitDecision::limited(retry_after))
    }
}

/// Sorted-set log per key; scores are Redis server time in milliseconds so
/// every instance shares one clock.
const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local window = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local member = ARGV[3]

local time = redis.call('TIME')
local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local used = redis.call('ZCARD', key)

if used < limit then
    redis.call('ZADD', key, now, member)
    redis.call('PEXPIRE', key, window)
    return {1, limit - used - 1, 0}
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local retry = window
if oldest[2] then
    retry = tonumber(oldest[2]) + window - now
end
return {0, 0, retry}
";

/// Redis-backed sliding-window log.
///
/// The whole check runs as one Lua script, so concurrent attempts from
/// different server instances serialize inside Redis.
#[derive(Clone)]
pub struct RedisSlidingWindow {
    redis: Arc<RedisClient>,
    prefix: String,
    id_gen: IdGenerator,
}

impl RedisSlidingWindow {
    /// Create a new Redis store. Keys are namespaced under `prefix`.
    #[must_use]
    pub fn new(redis: Arc<RedisClient>, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            id_gen: IdGenerator::new(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl SlidingWindowStore for RedisSlidingWindow {
    async fn try_acquire(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> AppResult<RateLimitDecision> {
        let window_ms = config.window.as_millis().to_string();
        let args = vec![
            window_ms,
            config.max_requests.to_string(),
            // Unique member so attempts in the same millisecond are all counted
            self.id_gen.generate(),
        ];

        let reply: Vec<i64> = self
            .redis
            .eval(SLIDING_WINDOW_SCRIPT, vec![self.redis_key(key)], args)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;

        decode_script_reply(&reply)
    }
}

/// Decode `{allowed, remaining, retry_ms}`.
fn decode_script_reply(reply: &[i64]) -> AppResult<RateLimitDecision> {
    match *reply {
        [1, remaining, _] => Ok(RateLimitDecision::allowed(
            u32::try_from(remaining).unwrap_or(0),
        )),
        [0, _, retry_ms] => Ok(RateLimitDecision::limited(Duration::from_millis(
            u64::try_from(retry_ms).unwrap_or(0),
        ))),
        _ => Err(AppError::Redis(format!(
            "Unexpected rate limit script reply: {reply:?}"
        ))),
    }
}

/// Per-author admission control for post creation.
#[derive(Clone)]
pub struct PostRateLimiter {
    store: Arc<dyn SlidingWindowStore>,
    config: RateLimitConfig,
}

impl PostRateLimiter {
    /// Create a limiter over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SlidingWindowStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Create a process-local limiter with the default post limits.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySlidingWindow::new()), limits::POST_CREATE)
    }

    /// Active limits.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit and record one write attempt for `author_id`, or reject it
    /// without recording anything.
    pub async fn check_and_consume(&self, author_id: &str) -> AppResult<RateLimitDecision> {
        let key = format!("post:{author_id}");
        let decision = self.store.try_acquire(&key, &self.config).await?;

        if decision.allowed {
            tracing::debug!(author_id = %author_id, remaining = decision.remaining, "Post admitted");
        } else {
            tracing::info!(
                author_id = %author_id,
                retry_after_ms = decision.retry_after.as_millis() as u64,
                "Post rate limited"
            );
        }

        Ok(decision)
    }
}
