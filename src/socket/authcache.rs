//! Digest challenge cache.
//!
//! Remembers the last challenge seen for a (host, username, password) triple
//! so later requests can authenticate on the first attempt.
//!
//! The cache is bounded by total cost. Admission and eviction follow moka's
//! TinyLFU policy, so an entry may be evicted or refused before it is ever
//! reused. A lookup that misses only costs the caller one extra
//! unauthenticated round trip.

use crate::base::neterror::NetError;
use crate::http::digestauth::Challenge;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Upper bound accepted for `num_counters`.
pub const MAX_NUM_COUNTERS: usize = 1 << 24;

/// Upper bound accepted for `buffer_items`.
pub const MAX_BUFFER_ITEMS: usize = 1 << 16;

/// Auth cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthCacheConfig {
    /// Total cost the cache may hold. Every challenge costs 1, so this is the
    /// approximate maximum number of host/credential pairs.
    pub max_cost: u64,
    /// Expected number of distinct keys tracked, about 10x the entries that
    /// fit. Sizes the initial table.
    pub num_counters: usize,
    /// Writes batched before pending admission and eviction work is applied.
    pub buffer_items: usize,
    /// Track hit/miss/eviction counters.
    pub metrics: bool,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self {
            max_cost: 50,
            num_counters: 50 * 10,
            buffer_items: 64,
            metrics: false,
        }
    }
}

impl AuthCacheConfig {
    fn validate(&self) -> Result<(), NetError> {
        if self.max_cost == 0 || self.num_counters == 0 || self.buffer_items == 0 {
            return Err(NetError::InvalidCacheConfig);
        }
        if self.num_counters > MAX_NUM_COUNTERS || self.buffer_items > MAX_BUFFER_ITEMS {
            return Err(NetError::InvalidCacheConfig);
        }
        Ok(())
    }

    fn initial_capacity(&self) -> usize {
        (self.num_counters / 10).max(1)
    }
}

/// Cache activity counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    keys_added: AtomicU64,
    keys_evicted: AtomicU64,
    sets_rejected: AtomicU64,
}

impl CacheMetrics {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn keys_added(&self) -> u64 {
        self.keys_added.load(Ordering::Relaxed)
    }

    /// Entries dropped by the size policy, including refused admissions.
    pub fn keys_evicted(&self) -> u64 {
        self.keys_evicted.load(Ordering::Relaxed)
    }

    pub fn sets_rejected(&self) -> u64 {
        self.sets_rejected.load(Ordering::Relaxed)
    }

    /// Fraction of lookups that hit, 0.0 when nothing was looked up.
    pub fn ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.keys_added,
            &self.keys_evicted,
            &self.sets_rejected,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Clone)]
struct CacheEntry {
    challenge: Arc<Challenge>,
    cost: u32,
}

/// Thread-safe, cost-bounded cache of digest challenges.
///
/// Keys are `host,username,password`; see [`DigestAuthCache::key`]. Values
/// are shared read-only as `Arc<Challenge>`.
pub struct DigestAuthCache {
    entries: Cache<String, CacheEntry>,
    config: AuthCacheConfig,
    metrics: Option<Arc<CacheMetrics>>,
    pending_writes: AtomicUsize,
    closed: AtomicBool,
}

impl fmt::Debug for DigestAuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuthCache")
            .field("entries", &self.entries.entry_count())
            .field("cost", &self.entries.weighted_size())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DigestAuthCache {
    /// Create a cache, rejecting zero-sized or oversized limits.
    pub fn new(config: AuthCacheConfig) -> Result<Self, NetError> {
        config.validate()?;

        let metrics = config.metrics.then(|| Arc::new(CacheMetrics::default()));

        let mut builder = Cache::builder()
            .max_capacity(config.max_cost)
            .initial_capacity(config.initial_capacity())
            .weigher(|_key: &String, entry: &CacheEntry| entry.cost);

        if let Some(metrics) = &metrics {
            let metrics = Arc::clone(metrics);
            builder = builder.eviction_listener(
                move |_key: Arc<String>, _entry: CacheEntry, cause: RemovalCause| {
                    if cause == RemovalCause::Size {
                        metrics.keys_evicted.fetch_add(1, Ordering::Relaxed);
                    }
                },
            );
        }

        Ok(Self {
            entries: builder.build(),
            config,
            metrics,
            pending_writes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Build the cache key for a host and credential pair.
    pub fn key(host: &str, username: &str, password: &str) -> String {
        [host, username, password].join(",")
    }

    /// Look up the challenge stored under `key`.
    pub fn get(&self, key: &str) -> Option<Arc<Challenge>> {
        if self.is_closed() {
            return None;
        }

        let found = self.entries.get(key).map(|entry| entry.challenge);
        if let Some(metrics) = &self.metrics {
            let counter = if found.is_some() {
                &metrics.hits
            } else {
                &metrics.misses
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store `challenge` under `key` with the given cost.
    ///
    /// Returns `false` when the write is refused outright: the cache is closed
    /// or the cost exceeds the whole budget. An accepted write may still be
    /// evicted later by the size policy.
    pub fn set(&self, key: String, challenge: Arc<Challenge>, cost: u32) -> bool {
        if self.is_closed() || u64::from(cost) > self.config.max_cost {
            if let Some(metrics) = &self.metrics {
                metrics.sets_rejected.fetch_add(1, Ordering::Relaxed);
            }
            return false;
        }

        self.entries.insert(key, CacheEntry { challenge, cost });
        if let Some(metrics) = &self.metrics {
            metrics.keys_added.fetch_add(1, Ordering::Relaxed);
        }

        if self.pending_writes.fetch_add(1, Ordering::Relaxed) + 1 >= self.config.buffer_items {
            self.pending_writes.store(0, Ordering::Relaxed);
            self.entries.run_pending_tasks();
        }
        true
    }

    /// Remove the entry stored under `key`, if any.
    pub fn del(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Drop every entry and reset metrics.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        if let Some(metrics) = &self.metrics {
            metrics.reset();
        }
    }

    /// Release the cache contents.
    ///
    /// Owners must not route requests through a closed cache; lookups miss
    /// and writes are refused afterwards.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.entries.invalidate_all();
            self.entries.run_pending_tasks();
            tracing::debug!("auth cache closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get number of cached entries, after applying pending evictions.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total cost currently held, after applying pending evictions.
    pub fn cost(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.weighted_size()
    }

    pub fn config(&self) -> &AuthCacheConfig {
        &self.config
    }

    /// Activity counters, when enabled in the config.
    pub fn metrics(&self) -> Option<&CacheMetrics> {
        self.metrics.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(nonce: &str) -> Arc<Challenge> {
        Arc::new(Challenge {
            realm: "example.com".to_string(),
            nonce: nonce.to_string(),
            qop: "auth".to_string(),
            ..Default::default()
        })
    }

    fn metered(max_cost: u64) -> DigestAuthCache {
        DigestAuthCache::new(AuthCacheConfig {
            max_cost,
            num_counters: 100,
            buffer_items: 1,
            metrics: true,
        })
        .unwrap()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(
            DigestAuthCache::key("example.com", "john", "hello"),
            "example.com,john,hello"
        );
    }

    #[test]
    fn test_store_and_lookup() {
        let cache = metered(10);
        let key = DigestAuthCache::key("example.com", "john", "hello");

        assert!(cache.get(&key).is_none());
        assert!(cache.set(key.clone(), challenge("n1"), 1));

        let found = cache.get(&key).unwrap();
        assert_eq!(found.nonce, "n1");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cost(), 1);

        let metrics = cache.metrics().unwrap();
        assert_eq!(metrics.misses(), 1);
        assert_eq!(metrics.hits(), 1);
        assert_eq!(metrics.keys_added(), 1);
        assert!((metrics.ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_credentials_partition_keys() {
        let cache = metered(10);
        cache.set(DigestAuthCache::key("h", "john", "hello"), challenge("a"), 1);

        assert!(cache.get(&DigestAuthCache::key("h", "foo", "hello")).is_none());
        assert!(cache.get(&DigestAuthCache::key("h", "john", "other")).is_none());
        assert!(cache.get(&DigestAuthCache::key("h", "john", "hello")).is_some());
    }

    #[test]
    fn test_replace_keeps_cost() {
        let cache = metered(10);
        cache.set("k".to_string(), challenge("old"), 1);
        cache.set("k".to_string(), challenge("new"), 1);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.cost(), 1);
        assert_eq!(cache.get("k").unwrap().nonce, "new");
    }

    #[test]
    fn test_delete() {
        let cache = metered(10);
        cache.set("k".to_string(), challenge("n"), 1);
        cache.del("k");
        cache.del("missing");

        assert!(cache.get("k").is_none());
        assert_eq!(cache.cost(), 0);
    }

    #[test]
    fn test_cost_bound_is_respected() {
        let cache = metered(3);
        for i in 0..20 {
            let key = format!("host{},u,p", i);
            cache.get(&key);
            cache.set(key, challenge("n"), 1);
            assert!(cache.cost() <= 3);
        }
        assert!(cache.len() <= 3);
        assert!(cache.metrics().unwrap().keys_evicted() > 0);
    }

    #[test]
    fn test_cold_entry_makes_room_for_busy_host() {
        let cache = metered(5);
        for i in 0..4 {
            cache.set(format!("hot{}", i), challenge("n"), 1);
        }
        cache.set("cold".to_string(), challenge("n"), 1);
        for _ in 0..3 {
            for i in 0..4 {
                assert!(cache.get(&format!("hot{}", i)).is_some());
            }
        }

        // A host that keeps being asked for gains admission over the idle one.
        for _ in 0..8 {
            cache.get("busy");
        }
        cache.set("busy".to_string(), challenge("n"), 1);

        assert!(cache.len() <= 5);
        assert!(cache.get("busy").is_some());
        assert!(cache.get("cold").is_none());
        for i in 0..4 {
            assert!(cache.get(&format!("hot{}", i)).is_some());
        }
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let cache = metered(2);
        assert!(!cache.set("k".to_string(), challenge("n"), 5));
        assert!(cache.is_empty());
        assert_eq!(cache.metrics().unwrap().sets_rejected(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = metered(10);
        cache.set("a".to_string(), challenge("n"), 1);
        cache.set("b".to_string(), challenge("n"), 1);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.cost(), 0);
        assert_eq!(cache.metrics().unwrap().keys_added(), 0);
    }

    #[test]
    fn test_close_rejects_use() {
        let cache = metered(10);
        cache.set("a".to_string(), challenge("n"), 1);

        cache.close();
        cache.close();

        assert!(cache.is_closed());
        assert!(cache.is_empty());
        assert!(cache.get("a").is_none());
        assert!(!cache.set("a".to_string(), challenge("n"), 1));
    }

    #[test]
    fn test_invalid_config() {
        for config in [
            AuthCacheConfig {
                max_cost: 0,
                ..Default::default()
            },
            AuthCacheConfig {
                num_counters: 0,
                ..Default::default()
            },
            AuthCacheConfig {
                buffer_items: 0,
                ..Default::default()
            },
            AuthCacheConfig {
                num_counters: usize::MAX,
                ..Default::default()
            },
            AuthCacheConfig {
                buffer_items: MAX_BUFFER_ITEMS + 1,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                DigestAuthCache::new(config),
                Err(NetError::InvalidCacheConfig)
            ));
        }
    }

    #[test]
    fn test_huge_config_from_json_is_refused() {
        let config: AuthCacheConfig =
            serde_json::from_str(r#"{"num_counters": 18446744073709551615}"#).unwrap();
        assert_eq!(
            DigestAuthCache::new(config).unwrap_err(),
            NetError::InvalidCacheConfig
        );
    }

    #[test]
    fn test_metrics_disabled_by_default() {
        let cache = DigestAuthCache::new(AuthCacheConfig::default()).unwrap();
        assert!(cache.metrics().is_none());
        assert_eq!(cache.config().max_cost, 50);
    }

    #[test]
    fn test_config_from_json() {
        let config: AuthCacheConfig =
            serde_json::from_str(r#"{"max_cost": 10, "metrics": true}"#).unwrap();
        assert_eq!(config.max_cost, 10);
        assert_eq!(config.num_counters, 500);
        assert_eq!(config.buffer_items, 64);
        assert!(config.metrics);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(metered(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("host{},u{},p", i % 10, t);
                        if cache.get(&key).is_none() {
                            cache.set(key.clone(), challenge("n"), 1);
                        }
                        if i % 7 == 0 {
                            cache.del(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 50);
    }
}
