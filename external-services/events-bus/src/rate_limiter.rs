//! Per-connection rate limiting for real-time requests
//!
//! Rolling-window counter: at most `max_events` requests per connection in any
//! `window`. Windows live in an injected `WindowStore` so several server
//! instances can share them; requests over the limit are rejected, never queued.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BusError, Result};

/// Rate limiter configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RateLimiterConfig {
    /// Maximum number of requests allowed in the window
    pub max_events: u32,
    /// Rolling window (in seconds, for serialization)
    #[serde(with = "duration_secs")]
    pub window: Duration,
    /// Whether rate limiting is enabled
    pub enabled: bool,
}

// Serialize Duration as seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_events: 20,
            window: Duration::from_secs(10),
            enabled: true,
        }
    }
}

/// Outcome of recording one request against a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Keyed rolling-window storage
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Record one request for `key` unless `limit` requests already fall inside `window`
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<WindowDecision>;

    /// Drop all state for `key`
    async fn forget(&self, key: &str) -> Result<()>;
}

struct Slot {
    key: String,
    hits: VecDeque<Instant>,
    expires_at: Instant,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    expiry: BTreeSet<(Instant, usize)>,
}

impl Arena {
    fn evict_expired(&mut self, now: Instant) {
        while let Some(&(at, idx)) = self.expiry.first() {
            if at > now {
                break;
            }
            self.expiry.pop_first();
            self.release(idx);
        }
    }

    fn release(&mut self, idx: usize) {
        if let Some(slot) = self.slots.get_mut(idx).and_then(Option::take) {
            self.index.remove(&slot.key);
            self.free.push(idx);
        }
    }

    fn slot_for(&mut self, key: &str, now: Instant) -> usize {
        if let Some(&idx) = self.index.get(key) {
            return idx;
        }
        let slot = Slot {
            key: key.to_string(),
            hits: VecDeque::new(),
            expires_at: now,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                if let Some(entry) = self.slots.get_mut(idx) {
                    *entry = Some(slot);
                }
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        self.index.insert(key.to_string(), idx);
        self.expiry.insert((now, idx));
        idx
    }

    fn hit(&mut self, key: &str, limit: u32, window: Duration, now: Instant) -> WindowDecision {
        self.evict_expired(now);
        let idx = self.slot_for(key, now);
        let Some(slot) = self.slots.get_mut(idx).and_then(Option::as_mut) else {
            return WindowDecision::Allowed { remaining: limit };
        };

        while let Some(&oldest) = slot.hits.front() {
            if now.duration_since(oldest) >= window {
                slot.hits.pop_front();
            } else {
                break;
            }
        }

        let used = u32::try_from(slot.hits.len()).unwrap_or(u32::MAX);
        if used >= limit {
            let retry_after = slot
                .hits
                .front()
                .map_or(window, |oldest| window.saturating_sub(now.duration_since(*oldest)));
            return WindowDecision::Limited { retry_after };
        }

        slot.hits.push_back(now);
        let previous = slot.expires_at;
        slot.expires_at = now + window;
        let expires_at = slot.expires_at;
        self.expiry.remove(&(previous, idx));
        self.expiry.insert((expires_at, idx));

        WindowDecision::Allowed {
            remaining: limit - used - 1,
        }
    }
}

/// Process-local window store: slot arena plus an expiry index, so idle keys
/// are evicted once their window has passed
#[derive(Default)]
pub struct InMemoryWindowStore {
    arena: Mutex<Arena>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_at(&self, key: &str, limit: u32, window: Duration, now: Instant) -> WindowDecision {
        self.arena.lock().hit(key, limit, window, now)
    }

    /// Number of keys currently holding a window
    pub fn tracked_keys(&self) -> usize {
        self.arena.lock().index.len()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<WindowDecision> {
        Ok(self.hit_at(key, limit, window, Instant::now()))
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut guard = self.arena.lock();
        let arena = &mut *guard;
        if let Some(idx) = arena.index.get(key).copied() {
            let expires_at = arena
                .slots
                .get(idx)
                .and_then(Option::as_ref)
                .map(|slot| slot.expires_at);
            if let Some(at) = expires_at {
                arena.expiry.remove(&(at, idx));
            }
            arena.release(idx);
        }
        Ok(())
    }
}

/// Window store shared between instances, one sorted set per key
#[derive(Clone)]
pub struct RedisWindowStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisWindowStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| BusError::WindowStore(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BusError::WindowStore(e.to_string()))?;
        Ok(Self {
            conn,
            prefix: "homecare:ratelimit".to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn hit(&self, key: &str, limit: u32, window: Duration) -> Result<WindowDecision> {
        let redis_key = self.key(key);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let member = format!("{now_ms}-{}", Uuid::new_v4());
        let mut conn = self.conn.clone();

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg("-inf")
            .arg(now_ms - window_ms)
            .ignore()
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("ZCARD")
            .arg(&redis_key)
            .cmd("PEXPIRE")
            .arg(&redis_key)
            .arg(window_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::WindowStore(e.to_string()))?;

        if count <= u64::from(limit) {
            let remaining = u32::try_from(u64::from(limit) - count).unwrap_or(0);
            return Ok(WindowDecision::Allowed { remaining });
        }

        redis::cmd("ZREM")
            .arg(&redis_key)
            .arg(&member)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BusError::WindowStore(e.to_string()))?;

        let oldest: Vec<(String, i64)> = redis::cmd("ZRANGE")
            .arg(&redis_key)
            .arg(0)
            .arg(0)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::WindowStore(e.to_string()))?;

        let retry_ms = oldest
            .first()
            .map_or(window_ms, |(_, score)| (score + window_ms - now_ms).max(0));
        Ok(WindowDecision::Limited {
            retry_after: Duration::from_millis(u64::try_from(retry_ms).unwrap_or(0)),
        })
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BusError::WindowStore(e.to_string()))
    }
}

/// Rate limiter keyed by connection
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    store: Arc<dyn WindowStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, store: Arc<dyn WindowStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn key(connection: Uuid) -> String {
        format!("conn:{connection}")
    }

    /// Count one request for the connection
    ///
    /// Returns `Err(BusError::RateLimited)` once the window is full.
    pub async fn check(&self, connection: Uuid) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        match self
            .store
            .hit(&Self::key(connection), self.config.max_events, self.config.window)
            .await?
        {
            WindowDecision::Allowed { .. } => Ok(()),
            WindowDecision::Limited { retry_after } => {
                debug!(connection = %connection, ?retry_after, "Rate limit exceeded");
                Err(BusError::RateLimited { retry_after })
            }
        }
    }

    /// Drop the connection's window (on disconnect)
    pub async fn release(&self, connection: Uuid) -> Result<()> {
        self.store.forget(&Self::key(connection)).await
    }
}
