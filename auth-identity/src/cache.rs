//! Cost-bounded in-memory cache with hit/miss accounting.

use crate::models::{Group, User};
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cost charged for an entry when the caller does not pick one.
pub const DEFAULT_ENTRY_COST: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Accepted for compatibility with existing deployments; admission is
    /// handled by the cache itself.
    #[serde(default = "default_num_counters")]
    pub num_counters: u64,
    /// Upper bound on the summed cost of all live entries.
    #[serde(default = "default_max_cost")]
    pub max_cost: u64,
    /// Accepted for compatibility with existing deployments.
    #[serde(default = "default_buffer_items")]
    pub buffer_items: u64,
    #[serde(default = "default_metrics")]
    pub metrics: bool,
    #[serde(default = "default_ttl_in_seconds")]
    pub ttl_in_seconds: u64,
}

fn default_num_counters() -> u64 {
    10_000_000
}

fn default_max_cost() -> u64 {
    1_073_741_824
}

fn default_buffer_items() -> u64 {
    64
}

fn default_metrics() -> bool {
    true
}

fn default_ttl_in_seconds() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_counters: default_num_counters(),
            max_cost: default_max_cost(),
            buffer_items: default_buffer_items(),
            metrics: default_metrics(),
            ttl_in_seconds: default_ttl_in_seconds(),
        }
    }
}

impl CacheConfig {
    /// TTL callers may pass to [`InMemoryCache::set_with_ttl`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_in_seconds)
    }
}

/// Values the cache can hold. Reads check the variant explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Group(Group),
    User(User),
    Text(String),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Group(_) => "group",
            CacheValue::User(_) => "user",
            CacheValue::Text(_) => "text",
        }
    }
}

/// Domain types that can be stored in and recovered from a [`CacheValue`].
pub trait Cacheable: Sized {
    fn into_cache_value(self) -> CacheValue;

    /// `None` when the cached value holds a different type.
    fn from_cache_value(value: CacheValue) -> Option<Self>;
}

impl Cacheable for Group {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::Group(self)
    }

    fn from_cache_value(value: CacheValue) -> Option<Self> {
        match value {
            CacheValue::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl Cacheable for User {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::User(self)
    }

    fn from_cache_value(value: CacheValue) -> Option<Self> {
        match value {
            CacheValue::User(user) => Some(user),
            _ => None,
        }
    }
}

impl Cacheable for String {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::Text(self)
    }

    fn from_cache_value(value: CacheValue) -> Option<Self> {
        match value {
            CacheValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    cost: u32,
    ttl: Option<Duration>,
}

struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    keys_added: AtomicU64,
    keys_updated: AtomicU64,
    keys_evicted: AtomicU64,
    cost_added: AtomicU64,
    cost_evicted: AtomicU64,
    sets_dropped: AtomicU64,
    sets_rejected: AtomicU64,
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub ratio: f64,
    pub cost_added: u64,
    pub cost_evicted: u64,
    pub gets_kept: u64,
    pub gets_dropped: u64,
    pub keys_added: u64,
    pub keys_evicted: u64,
    pub keys_updated: u64,
    pub sets_dropped: u64,
    pub sets_rejected: u64,
}

#[derive(Clone)]
pub struct InMemoryCache {
    cache: Cache<String, CacheEntry>,
    counters: Arc<Counters>,
    config: CacheConfig,
}

impl InMemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = counters.clone();

        let cache = Cache::builder()
            .max_capacity(config.max_cost)
            .weigher(|_key: &String, entry: &CacheEntry| entry.cost)
            .expire_after(EntryExpiry)
            .eviction_listener(move |key, entry: CacheEntry, cause| {
                if matches!(cause, RemovalCause::Size | RemovalCause::Expired) {
                    listener_counters.keys_evicted.fetch_add(1, Ordering::Relaxed);
                    listener_counters
                        .cost_evicted
                        .fetch_add(u64::from(entry.cost), Ordering::Relaxed);
                    debug!(key = %key, cause = ?cause, "Cache entry evicted");
                }
            })
            .build();

        Self {
            cache,
            counters,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store without expiry. Returns `false` when the set was not admitted.
    pub async fn set<T: Cacheable>(&self, key: &str, value: T, cost: u32) -> bool {
        self.insert(key, value.into_cache_value(), cost, None).await
    }

    /// Store with an absolute TTL. A zero TTL drops the set.
    pub async fn set_with_ttl<T: Cacheable>(
        &self,
        key: &str,
        value: T,
        cost: u32,
        ttl: Duration,
    ) -> bool {
        if ttl.is_zero() {
            self.counters.sets_dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.insert(key, value.into_cache_value(), cost, Some(ttl))
            .await
    }

    async fn insert(&self, key: &str, value: CacheValue, cost: u32, ttl: Option<Duration>) -> bool {
        let cost = if cost == 0 { DEFAULT_ENTRY_COST } else { cost };
        if u64::from(cost) > self.config.max_cost {
            self.counters.sets_rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if self.cache.contains_key(key) {
            self.counters.keys_updated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.keys_added.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .cost_added
            .fetch_add(u64::from(cost), Ordering::Relaxed);

        self.cache
            .insert(key.to_string(), CacheEntry { value, cost, ttl })
            .await;
        true
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Flush pending maintenance so earlier writes and evictions are visible.
    pub async fn wait(&self) {
        self.cache.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Counter snapshot; `None` when metrics are disabled in the config.
    pub fn metrics(&self) -> Option<CacheMetrics> {
        if !self.config.metrics {
            return None;
        }

        let c = &self.counters;
        let hits = c.hits.load(Ordering::Relaxed);
        let misses = c.misses.load(Ordering::Relaxed);
        let lookups = hits.saturating_add(misses);
        #[allow(clippy::cast_precision_loss)]
        let ratio = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        Some(CacheMetrics {
            hits,
            misses,
            ratio,
            cost_added: c.cost_added.load(Ordering::Relaxed),
            cost_evicted: c.cost_evicted.load(Ordering::Relaxed),
            gets_kept: lookups,
            gets_dropped: 0,
            keys_added: c.keys_added.load(Ordering::Relaxed),
            keys_evicted: c.keys_evicted.load(Ordering::Relaxed),
            keys_updated: c.keys_updated.load(Ordering::Relaxed),
            sets_dropped: c.sets_dropped.load(Ordering::Relaxed),
            sets_rejected: c.sets_rejected.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_cache() -> InMemoryCache {
        InMemoryCache::new(CacheConfig::default())
    }

    #[tokio::test]
    async fn test_set_then_get_counts_hit() {
        let cache = create_test_cache();
        let group = Group::new("Platform", "platform", "org-1");

        assert!(cache.set("group:platform", group.clone(), 0).await);
        cache.wait().await;

        let value = cache.get("group:platform").await;
        assert_eq!(value, Some(CacheValue::Group(group)));
        assert!(cache.get("group:unknown").await.is_none());

        let metrics = cache.metrics().unwrap();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.keys_added, 1);
        assert_eq!(metrics.cost_added, 1);
        assert!((metrics.ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_overwrite_counts_update() {
        let cache = create_test_cache();
        cache.set("k", "a".to_string(), 1).await;
        cache.wait().await;
        cache.set("k", "b".to_string(), 1).await;
        cache.wait().await;

        assert_eq!(cache.get("k").await, Some(CacheValue::Text("b".to_string())));
        let metrics = cache.metrics().unwrap();
        assert_eq!(metrics.keys_added, 1);
        assert_eq!(metrics.keys_updated, 1);
    }

    #[tokio::test]
    async fn test_oversized_and_zero_ttl_sets_are_not_admitted() {
        let cache = InMemoryCache::new(CacheConfig {
            max_cost: 10,
            ..CacheConfig::default()
        });

        assert!(!cache.set("big", "x".to_string(), 11).await);
        assert!(
            !cache
                .set_with_ttl("gone", "x".to_string(), 1, Duration::ZERO)
                .await
        );
        cache.wait().await;

        assert!(cache.get("big").await.is_none());
        let metrics = cache.metrics().unwrap();
        assert_eq!(metrics.sets_rejected, 1);
        assert_eq!(metrics.sets_dropped, 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = create_test_cache();
        cache
            .set_with_ttl("short", "x".to_string(), 1, Duration::from_millis(50))
            .await;
        cache.wait().await;
        assert!(cache.get("short").await.is_some());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("short").await.is_none());
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let cache = InMemoryCache::new(CacheConfig {
            metrics: false,
            ..CacheConfig::default()
        });
        assert!(cache.metrics().is_none());
    }

    #[test]
    fn test_cacheable_rejects_other_variants() {
        let value = CacheValue::Text("not a group".to_string());
        assert!(Group::from_cache_value(value).is_none());
        assert_eq!(CacheValue::Text(String::new()).kind(), "text");
    }
}
