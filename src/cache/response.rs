//! Response cache for deterministic operations.
//!
//! [`ResponseCache`] stores provider responses for operations whose
//! effective temperature is at or below the deterministic-caching threshold
//! (see [`CacheConfig::deterministic_temperature_threshold`]). Creative
//! operations are never cached; the orchestrator checks the threshold before
//! touching the cache at all.
//!
//! # Architecture
//!
//! Storage is moka's concurrent cache with an LRU eviction policy bounded
//! by entry count. Expiry is tracked per entry (each `set` carries its own
//! TTL) and enforced by vordr rather than moka, so that every removal is
//! counted exactly once:
//!
//! - a `get` on an expired entry is a miss and removes the entry;
//! - [`ResponseCache::evict_expired`] sweeps every expired entry, and
//!   [`spawn_expiry_sweeper`] runs that sweep periodically;
//! - capacity evictions and size accounting are observed through moka's
//!   eviction listener.
//!
//! Concurrent `set` calls on the same key resolve to last-writer-wins.
//! Expiry removal is a per-key atomic compute, so a sweep never removes a
//! value written after it looked at the key.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::key::CacheKey;
use crate::telemetry;

/// Configuration for the response cache.
///
/// ```rust
/// # use vordr::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .default_ttl(Duration::from_secs(3600))
///     .deterministic_temperature_threshold(0.3);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether the orchestrator consults the cache at all. Default: true.
    pub enabled: bool,
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// TTL for entries stored without an explicit TTL. Default: 1 hour.
    pub default_ttl: Duration,
    /// Highest effective temperature that is still cached. Default: 0.3.
    pub deterministic_temperature_threshold: f32,
    /// Period of the background expiry sweep, if one is spawned. Default: 5 minutes.
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            default_ttl: Duration::from_secs(3600),
            deterministic_temperature_threshold: 0.3,
            sweep_interval: Some(Duration::from_secs(300)),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with caching switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the default time-to-live.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn deterministic_temperature_threshold(mut self, threshold: f32) -> Self {
        self.deterministic_temperature_threshold = threshold;
        self
    }

    /// Set (or with `None`, disable) the background sweep period.
    pub fn sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Whether an operation at `temperature` may be cached.
    pub fn is_cacheable(&self, temperature: f32) -> bool {
        self.enabled && temperature <= self.deterministic_temperature_threshold
    }
}

/// Stored value plus bookkeeping. Owned by the cache.
#[derive(Debug)]
struct StoredEntry {
    key: CacheKey,
    payload: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    deadline: Instant,
    size_bytes: u64,
    access_count: AtomicU64,
    last_accessed_at: Mutex<DateTime<Utc>>,
}

impl StoredEntry {
    fn new(key: CacheKey, payload: String, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let started = Instant::now();
        let deadline = started
            .checked_add(ttl)
            .unwrap_or(started + Duration::from_secs(u32::MAX.into()));
        let size_bytes = (key.as_str().len() + payload.len()) as u64;
        Self {
            key,
            payload,
            created_at: now,
            expires_at,
            deadline,
            size_bytes,
            access_count: AtomicU64::new(0),
            last_accessed_at: Mutex::new(now),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    fn touch(&self) {
        self.access_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_accessed_at.lock() {
            *last = Utc::now();
        }
    }

    fn snapshot(&self) -> CacheEntry {
        let last_accessed_at = self
            .last_accessed_at
            .lock()
            .map(|t| *t)
            .unwrap_or(self.created_at);
        CacheEntry {
            key: self.key.clone(),
            payload: self.payload.clone(),
            created_at: self.created_at,
            last_accessed_at,
            expires_at: self.expires_at,
            access_count: self.access_count.load(Ordering::Relaxed),
            size_bytes: self.size_bytes,
        }
    }
}

/// Read-only view of a cache entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: u64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0 when there were no lookups.
    pub hit_rate: f64,
    /// Entries dropped to stay within `max_entries`.
    pub evictions: u64,
    /// Entries removed because their TTL passed.
    pub expirations: u64,
    pub total_size_bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    size_bytes: AtomicU64,
}

/// Bounded, TTL-aware LRU cache of provider responses.
///
/// Safe to share across sessions (`Arc<ResponseCache>`); all methods take
/// `&self`.
pub struct ResponseCache {
    cache: Cache<CacheKey, Arc<StoredEntry>>,
    counters: Arc<Counters>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let counters = Arc::new(Counters::default());
        let listener_counters = Arc::clone(&counters);
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(
                move |_key: Arc<CacheKey>, entry: Arc<StoredEntry>, cause: RemovalCause| {
                    listener_counters
                        .size_bytes
                        .fetch_sub(entry.size_bytes, Ordering::Relaxed);
                    if cause == RemovalCause::Size {
                        listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "cause" => "size")
                            .increment(1);
                    }
                },
            )
            .build();
        Self {
            cache,
            counters,
            config: config.clone(),
        }
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a payload.
    ///
    /// Returns `None` on a miss. An expired entry counts as a miss and is
    /// removed. A hit refreshes the entry's LRU position, increments its
    /// access count and updates its last-access time.
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        match self.cache.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                self.remove_if_expired(key);
                self.record_miss();
                None
            }
            Some(entry) => {
                entry.touch();
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Some(entry.payload.clone())
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    /// Store a payload with an explicit TTL.
    ///
    /// Overwrites any existing entry for the key, resetting its TTL, access
    /// count and LRU position.
    pub fn set(&self, key: CacheKey, payload: impl Into<String>, ttl: Duration) {
        let entry = StoredEntry::new(key.clone(), payload.into(), ttl);
        self.counters
            .size_bytes
            .fetch_add(entry.size_bytes, Ordering::Relaxed);
        self.cache.insert(key, Arc::new(entry));
    }

    /// Store a payload with the configured default TTL.
    pub fn set_default(&self, key: CacheKey, payload: impl Into<String>) {
        self.set(key, payload, self.config.default_ttl);
    }

    /// Remove one entry. Returns whether it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.cache.remove(key).is_some()
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear(&self) -> u64 {
        let count = self.cache.iter().count() as u64;
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        debug!(removed = count, "response cache cleared");
        count
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn evict_expired(&self) -> u64 {
        let now = Instant::now();
        let expired: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| CacheKey::clone(&key))
            .collect();
        let removed = expired
            .iter()
            .filter(|key| self.remove_if_expired(key))
            .count() as u64;
        self.cache.run_pending_tasks();
        if removed > 0 {
            debug!(removed, "evicted expired cache entries");
        }
        removed
    }

    /// Read-only snapshot of an entry, without counting a hit.
    ///
    /// Expired entries are reported as absent. Note that the lookup still
    /// refreshes the entry's LRU position.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.snapshot())
    }

    /// Current statistics.
    ///
    /// Settles moka's pending maintenance first so entry counts and
    /// eviction totals are exact at the time of the call.
    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.cache.entry_count(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            total_size_bytes: self.counters.size_bytes.load(Ordering::Relaxed),
        }
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
    }

    /// Atomically remove `key` if its current value has expired.
    fn remove_if_expired(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        let result = self
            .cache
            .entry(key.clone())
            .and_compute_with(|current| match current {
                Some(entry) if entry.value().is_expired(now) => Op::Remove,
                _ => Op::Nop,
            });
        let removed = matches!(result, CompResult::Removed(_));
        if removed {
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "cause" => "expired")
                .increment(1);
        }
        removed
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.cache.entry_count())
            .field("config", &self.config)
            .finish()
    }
}

/// Periodically remove expired entries until `shutdown` is cancelled.
///
/// # Panics
///
/// Requires a tokio runtime context.
pub fn spawn_expiry_sweeper(
    cache: Arc<ResponseCache>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    cache.evict_expired();
                }
            }
        }
        debug!("cache expiry sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_hex(s)
    }

    #[test]
    fn cacheable_respects_threshold_and_switch() {
        let config = CacheConfig::new().deterministic_temperature_threshold(0.3);
        assert!(config.is_cacheable(0.0));
        assert!(config.is_cacheable(0.3));
        assert!(!config.is_cacheable(0.31));
        assert!(!CacheConfig::disabled().is_cacheable(0.0));
    }

    #[test]
    fn size_accounting_follows_overwrites() {
        let cache = ResponseCache::new(&CacheConfig::default());
        cache.set(key("k"), "abcd", Duration::from_secs(60));
        assert_eq!(cache.stats().total_size_bytes, 5);
        cache.set(key("k"), "ab", Duration::from_secs(60));
        assert_eq!(cache.stats().total_size_bytes, 3);
        assert!(cache.remove(&key("k")));
        assert_eq!(cache.stats().total_size_bytes, 0);
    }

    #[test]
    fn hit_rate_zero_without_lookups() {
        let cache = ResponseCache::new(&CacheConfig::default());
        assert_eq!(cache.stats().hit_rate, 0.0);
    }
}
