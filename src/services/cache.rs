//! Dashboard cache.
//!
//! [`CacheStore`] is the raw key/value contract with two backends:
//! [`RedisCache`] over a `ConnectionManager` and the in-process
//! [`MemoryCache`]. [`Cache`] sits on top, namespaces keys, speaks JSON and
//! turns every backend fault into a miss.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::context::RequestContext;
use crate::domain::dashboard::{DashboardScope, ReportDomain};
use crate::error::CoreError;

/// Raw cache operations. Values are opaque strings.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Delete every key matching a glob `pattern` (`*` wildcards).
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self { conn })
    }

    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .context("Failed to read cache value")
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero TTL.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .context("Failed to set cache value")
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let deleted: usize = conn.del(keys).await.context("Failed to delete cache keys")?;
        Ok(deleted)
    }

    /// Walks the full SCAN cursor so no matching key is left behind.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .context("Failed to scan cache keys")?;
            if !keys.is_empty() {
                let n: usize = conn.del(&keys).await.context("Failed to delete cache keys")?;
                deleted += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(pattern = pattern, deleted = deleted, "Cache pattern delete");
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.context("Failed to check cache key")
    }
}

/// In-process store for tests and single-node setups.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|(_, exp)| *exp > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let live = entries
            .get(key)
            .filter(|(_, expires)| *expires > now)
            .map(|(value, _)| value.clone());
        if live.is_none() {
            entries.remove(key);
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let expires = Instant::now() + ttl;
        self.entries.lock().insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let mut entries = self.entries.lock();
        Ok(keys.iter().filter(|k| entries.remove(k.as_str()).is_some()).count())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok(before - entries.len())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self.entries.lock().get(key).is_some_and(|(_, exp)| *exp > now))
    }
}

/// Glob match with `*` as the only wildcard, as Redis `MATCH` uses it here.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };
    for piece in middle {
        match rest.find(piece) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Namespaced JSON cache over a [`CacheStore`]. Faults are logged and read as
/// misses; nothing here returns an error to the caller except invalidation,
/// which the write path logs itself.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    prefix: String,
    ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `{prefix}:dash:{domain}:{filters}:{start}:{end}`
    pub fn dashboard_key(&self, domain: ReportDomain, scope: &DashboardScope) -> String {
        format!("{}:dash:{}:{}", self.prefix, domain.key(), scope.cache_fragment())
    }

    /// Key for a dashboard not described by a scope, e.g. a rice-field year.
    pub fn dashboard_key_for(&self, domain: ReportDomain, fragment: &str) -> String {
        format!("{}:dash:{}:{}", self.prefix, domain.key(), fragment)
    }

    fn domain_pattern(&self, domain: ReportDomain) -> String {
        format!("{}:dash:{}:*", self.prefix, domain.key())
    }

    #[instrument(skip(self, ctx), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, ctx: &RequestContext, key: &str) -> Option<T> {
        let raw = match ctx.run(async { self.store.get(key).await.map_err(fault) }).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = key, error = %e, "Cache read failed");
                tracing::Span::current().record("cache_hit", false);
                return None;
            }
        };
        let Some(data) = raw else {
            debug!(key = key, "Cache miss");
            tracing::Span::current().record("cache_hit", false);
            return None;
        };
        match serde_json::from_str(&data) {
            Ok(value) => {
                debug!(key = key, "Cache hit");
                tracing::Span::current().record("cache_hit", true);
                Some(value)
            }
            Err(e) => {
                warn!(key = key, error = %e, "Failed to deserialize cached value");
                tracing::Span::current().record("cache_hit", false);
                None
            }
        }
    }

    /// Store `value` under `key` with the configured TTL. Failures are logged.
    #[instrument(skip(self, ctx, value))]
    pub async fn set<T: Serialize>(&self, ctx: &RequestContext, key: &str, value: &T) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to serialize value for cache");
                return;
            }
        };
        let result = ctx
            .run(async { self.store.set(key, data, self.ttl).await.map_err(fault) })
            .await;
        match result {
            Ok(()) => debug!(key = key, ttl_secs = self.ttl.as_secs(), "Cached value"),
            Err(e) => warn!(key = key, error = %e, "Cache write failed"),
        }
    }

    pub async fn exists(&self, ctx: &RequestContext, key: &str) -> bool {
        ctx.run(async { self.store.exists(key).await.map_err(fault) })
            .await
            .unwrap_or_else(|e| {
                warn!(key = key, error = %e, "Cache exists check failed");
                false
            })
    }

    /// Whether the backing store answers at all.
    pub async fn ping(&self) -> bool {
        let health_key = format!("{}:health", self.prefix);
        self.store.exists(&health_key).await.is_ok()
    }

    pub async fn delete(&self, ctx: &RequestContext, keys: &[String]) -> Result<usize, CoreError> {
        ctx.run(async { self.store.delete(keys).await.map_err(fault) }).await
    }

    /// Drop every cached dashboard of `domain`.
    pub async fn invalidate_domain(
        &self,
        ctx: &RequestContext,
        domain: ReportDomain,
    ) -> Result<usize, CoreError> {
        let pattern = self.domain_pattern(domain);
        let deleted = ctx
            .run(async { self.store.delete_pattern(&pattern).await.map_err(fault) })
            .await?;
        debug!(domain = %domain, deleted = deleted, "Dashboard cache invalidated");
        Ok(deleted)
    }

    /// Drop every key under this cache's prefix.
    pub async fn flush(&self, ctx: &RequestContext) -> Result<usize, CoreError> {
        let pattern = format!("{}:*", self.prefix);
        ctx.run(async { self.store.delete_pattern(&pattern).await.map_err(fault) })
            .await
    }
}

fn fault(err: anyhow::Error) -> CoreError {
    CoreError::StoreUnavailable(format!("cache: {err:#}"))
}
