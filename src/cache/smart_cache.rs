use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::config::{AdaptiveTtlConfig, CacheConfig, PrefetchConfig};
use crate::cache::entry::CacheEntry;
use crate::cache::stats::{CacheStats, EvictionReason};
use crate::error::Result;

/// An externally registered value loader consulted on a miss-storm (§4.1
/// "Prefetch"). The loader contract is intentionally underspecified beyond
/// "best effort, idempotent, may fail" — a failing or slow loader never
/// blocks the calling `get`/`put`.
#[async_trait::async_trait]
pub trait PrefetchLoader<V>: Send + Sync {
    async fn load(&self, key: &str) -> Option<V>;
}

struct WeakKeyRef {
    key: String,
    object: Weak<dyn Any + Send + Sync>,
}

struct AdaptiveTtlState {
    config: AdaptiveTtlConfig,
    current_ttl: Duration,
}

struct Inner<V> {
    l1: LruCache<String, CacheEntry<V>>,
    l2: Option<LruCache<String, CacheEntry<V>>>,
    l2_max_size: usize,
    l2_ttl: Duration,
    ttl: Duration,
    max_size: usize,
    dynamic_max_size: usize,
    stats: CacheStats,
    adaptive: Option<AdaptiveTtlState>,
    weak_refs: Vec<WeakKeyRef>,
    last_weak_cleanup: Instant,
    prefetch: Option<PrefetchConfig>,
}

impl<V> Inner<V> {
    /// Evicts the L1 entry identified by `(key, entry)`, demoting it to L2
    /// when tiering is enabled. `primary_reason` tags the L1-side eviction;
    /// a second eviction is recorded against `CapacityLimit` if making room
    /// in L2 forces an L2-side eviction of its own.
    fn demote_to_l2(&mut self, key: String, entry: CacheEntry<V>, primary_reason: EvictionReason) {
        self.stats.record_eviction(primary_reason);
        if let Some(l2) = &mut self.l2 {
            if l2.len() >= self.l2_max_size.max(1) && l2.pop_lru().is_some() {
                self.stats.record_eviction(EvictionReason::CapacityLimit);
            }
            l2.put(key, entry);
        }
    }

    fn ensure_l1_capacity(&mut self) {
        while self.l1.len() >= self.dynamic_max_size.max(1) {
            match self.l1.pop_lru() {
                Some((k, e)) => self.demote_to_l2(k, e, EvictionReason::CapacityLimit),
                None => break,
            }
        }
    }

    fn adapt_ttl(&mut self, rate_per_sec: f64) {
        let Some(state) = &mut self.adaptive else {
            return;
        };
        let cfg = &state.config;
        if rate_per_sec > cfg.raise_threshold_per_sec {
            let candidate = state.current_ttl.mul_f64(cfg.factor);
            state.current_ttl = candidate.min(Duration::from_secs(cfg.max_ttl_seconds));
        } else if rate_per_sec < cfg.lower_threshold_per_sec {
            let candidate = state.current_ttl.div_f64(cfg.factor);
            state.current_ttl = candidate.max(Duration::from_secs(cfg.min_ttl_seconds));
        }
        self.ttl = state.current_ttl;
    }
}

/// A bounded, TTL-bearing, LRU-ordered key/value store with optional L1/L2
/// tiering, adaptive TTL and weak-reference key tracking.
///
/// All mutating operations serialize under one `parking_lot::Mutex` per
/// instance, matching the single-critical-section requirement: the ordered
/// map, the L2 map and the counters are one unit of consistency.
pub struct SmartCache<V: Clone + Send + Sync + 'static> {
    inner: Mutex<Inner<V>>,
    loader: Mutex<Option<Arc<dyn PrefetchLoader<V>>>>,
    self_weak: Weak<SmartCache<V>>,
    name: String,
}

impl<V: Clone + Send + Sync + 'static> SmartCache<V> {
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let ttl = Duration::from_secs(config.ttl_seconds);
        let (l2, l2_max_size, l2_ttl) = match &config.tiering {
            Some(t) => (
                Some(LruCache::unbounded()),
                t.l2_max_size,
                Duration::from_secs(t.l2_ttl_seconds),
            ),
            None => (None, 0, Duration::from_secs(0)),
        };
        let adaptive = config
            .adaptive_ttl
            .clone()
            .map(|c| AdaptiveTtlState { current_ttl: ttl, config: c });
        let inner = Inner {
            l1: LruCache::unbounded(),
            l2,
            l2_max_size,
            l2_ttl,
            ttl,
            max_size: config.max_size,
            dynamic_max_size: config.max_size,
            stats: CacheStats {
                dynamic_max_size: config.max_size,
                ..CacheStats::default()
            },
            adaptive,
            weak_refs: Vec::new(),
            last_weak_cleanup: Instant::now(),
            prefetch: config.prefetch.clone(),
        };
        Ok(Arc::new_cyclic(|weak| SmartCache {
            inner: Mutex::new(inner),
            loader: Mutex::new(None),
            self_weak: weak.clone(),
            name: name.into(),
        }))
    }

    pub fn set_loader(&self, loader: Arc<dyn PrefetchLoader<V>>) {
        *self.loader.lock() = Some(loader);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock();
        let ttl = inner.ttl;
        let mut hit_value: Option<V> = None;
        let mut expired_l1 = false;
        if let Some(entry) = inner.l1.get_mut(key) {
            if entry.is_expired(ttl) {
                expired_l1 = true;
            } else {
                entry.mark_accessed();
                let rate = entry.access_rate_per_sec();
                hit_value = Some(entry.value.clone());
                inner.adapt_ttl(rate);
            }
        }
        if expired_l1 {
            inner.l1.pop(key);
            inner.stats.expired_removed += 1;
        }
        if let Some(value) = hit_value {
            inner.stats.hits += 1;
            self.after_access(&mut inner);
            return Some(value);
        }

        if inner.l2.is_some() {
            let popped = inner.l2.as_mut().unwrap().pop(key);
            if let Some(mut entry) = popped {
                let l2_ttl = inner.l2_ttl;
                if entry.is_expired(l2_ttl) {
                    inner.stats.expired_removed += 1;
                } else {
                    entry.mark_accessed();
                    let value = entry.value.clone();
                    inner.stats.hits += 1;
                    inner.stats.l2_hits += 1;
                    inner.stats.l2_promotions += 1;
                    inner.ensure_l1_capacity();
                    inner.l1.put(key.to_string(), entry);
                    inner.stats.current_size = inner.l1.len();
                    self.after_access(&mut inner);
                    return Some(value);
                }
            }
        }

        inner.stats.misses += 1;
        self.after_access(&mut inner);
        None
    }

    fn put_locked(inner: &mut Inner<V>, key: String, value: V) {
        inner.stats.puts += 1;
        if inner.l1.contains(&key) {
            if let Some(entry) = inner.l1.get_mut(&key) {
                entry.reset(value);
            }
            return;
        }
        inner.ensure_l1_capacity();
        inner.l1.put(key, CacheEntry::new(value));
        inner.stats.current_size = inner.l1.len();
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        let mut inner = self.inner.lock();
        Self::put_locked(&mut inner, key.into(), value);
    }

    pub fn put_with_expiry(&self, key: impl Into<String>, value: V, expires_at: Instant) {
        let key = key.into();
        let mut inner = self.inner.lock();
        inner.stats.puts += 1;
        if inner.l1.contains(&key) {
            if let Some(entry) = inner.l1.get_mut(&key) {
                entry.reset(value);
                entry.expires_at = Some(expires_at);
            }
            return;
        }
        inner.ensure_l1_capacity();
        inner.l1.put(key, CacheEntry::with_expiry(value, expires_at));
        inner.stats.current_size = inner.l1.len();
    }

    /// Associates `key` with a weak reference to `key_object` so that
    /// [`Self::perform_weak_map_cleanup`] can later reclaim the registry
    /// slot once the object itself has no remaining strong owners.
    pub fn put_tracked(
        &self,
        key: impl Into<String>,
        value: V,
        key_object: Arc<dyn Any + Send + Sync>,
    ) {
        let key = key.into();
        let mut inner = self.inner.lock();
        Self::put_locked(&mut inner, key.clone(), value);
        inner.weak_refs.push(WeakKeyRef {
            key,
            object: Arc::downgrade(&key_object),
        });
    }

    /// Checks liveness without mutating recency order or hit/miss counters.
    pub fn contains_live(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        if let Some(entry) = inner.l1.peek(key) {
            if !entry.is_expired(inner.ttl) {
                return true;
            }
        }
        if let Some(l2) = &inner.l2 {
            if let Some(entry) = l2.peek(key) {
                if !entry.is_expired(inner.l2_ttl) {
                    return true;
                }
            }
        }
        false
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed_l1 = inner.l1.pop(key).is_some();
        let removed_l2 = inner
            .l2
            .as_mut()
            .map(|l2| l2.pop(key).is_some())
            .unwrap_or(false);
        if removed_l1 || removed_l2 {
            inner.stats.record_eviction(EvictionReason::Explicit);
        }
        inner.stats.current_size = inner.l1.len();
        removed_l1 || removed_l2
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.l1.clear();
        if let Some(l2) = &mut inner.l2 {
            l2.clear();
        }
        inner.stats.current_size = 0;
    }

    pub fn size(&self) -> usize {
        self.inner.lock().l1.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Snapshot of current L1 entries, oldest-to-newest. The spec's "lazy
    /// sequence" becomes an owned `Vec` here: holding the instance lock open
    /// across caller-controlled iteration would violate the short-critical-
    /// section requirement of §5.
    pub fn scan_entries(&self) -> Vec<(String, CacheEntry<V>)> {
        let inner = self.inner.lock();
        inner.l1.iter().map(|(k, e)| (k.clone(), e.clone())).collect()
    }

    pub fn is_entry_expired(&self, entry: &CacheEntry<V>) -> bool {
        let inner = self.inner.lock();
        entry.is_expired(inner.ttl)
    }

    pub fn adjust_for_memory_pressure(&self, level: f64) {
        let level = level.clamp(0.0, 1.0);
        let mut inner = self.inner.lock();
        let factor = (1.0 - level).max(0.1);
        let new_cap = ((inner.max_size as f64) * factor).floor().max(1.0) as usize;
        inner.dynamic_max_size = new_cap;
        while inner.l1.len() > inner.dynamic_max_size {
            match inner.l1.pop_lru() {
                Some((k, e)) => inner.demote_to_l2(k, e, EvictionReason::MemoryPressure),
                None => break,
            }
        }
        inner.stats.current_size = inner.l1.len();
        inner.stats.dynamic_max_size = inner.dynamic_max_size;
        debug!(cache = %self.name, pressure = level, dynamic_max_size = new_cap, "adjusted cache for memory pressure");
    }

    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size
    }

    pub fn dynamic_max_size(&self) -> usize {
        self.inner.lock().dynamic_max_size
    }

    /// Sweeps the weak-reference registry, dropping entries whose tracked
    /// key object has no remaining strong owners. Rate-limited by
    /// `min_interval`, which callers shrink under memory pressure.
    pub fn perform_weak_map_cleanup(&self, min_interval: Duration) -> usize {
        let mut inner = self.inner.lock();
        if inner.last_weak_cleanup.elapsed() < min_interval {
            return 0;
        }
        inner.last_weak_cleanup = Instant::now();
        let before = inner.weak_refs.len();
        inner.weak_refs.retain(|w| w.object.strong_count() > 0);
        let reclaimed = before - inner.weak_refs.len();
        inner.stats.weak_refs_reclaimed += reclaimed as u64;
        reclaimed
    }

    fn after_access(&self, inner: &mut Inner<V>) {
        inner.stats.current_size = inner.l1.len();
        self.maybe_prefetch(inner);
    }

    fn maybe_prefetch(&self, inner: &mut Inner<V>) {
        let Some(cfg) = inner.prefetch.clone() else {
            return;
        };
        if inner.stats.total_requests() < cfg.min_samples {
            return;
        }
        if inner.stats.hit_rate() >= cfg.hit_rate_threshold {
            return;
        }
        let Some(loader) = self.loader.lock().clone() else {
            return;
        };
        let total_access: u64 = inner.l1.iter().map(|(_, e)| e.access_count).sum();
        if total_access == 0 {
            return;
        }
        let mut candidates: Vec<(String, f64)> = inner
            .l1
            .iter()
            .map(|(k, e)| (k.clone(), e.access_count as f64 / total_access as f64))
            .filter(|(_, share)| *share >= cfg.access_share_threshold)
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(cfg.max_keys);
        if candidates.is_empty() {
            return;
        }
        inner.stats.prefetch_attempts += 1;
        let Some(cache) = self.self_weak.upgrade() else {
            return;
        };
        let cache_name = self.name.clone();
        tokio::spawn(async move {
            stream::iter(candidates)
                .for_each_concurrent(None, |(key, _)| {
                    let loader = loader.clone();
                    let cache = cache.clone();
                    let cache_name = cache_name.clone();
                    async move {
                        match loader.load(&key).await {
                            Some(value) => cache.put(key, value),
                            None => {
                                debug!(cache = %cache_name, key = %key, "prefetch loader returned nothing");
                                cache.inner.lock().stats.prefetch_failures += 1;
                            }
                        }
                    }
                })
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::TieringConfig;

    fn cache(max_size: usize) -> Arc<SmartCache<i32>> {
        SmartCache::new(
            "test",
            CacheConfig {
                max_size,
                ttl_seconds: 3600,
                ..CacheConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn put_then_get_hits() {
        let c = cache(10);
        c.put("a", 1);
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.stats().hits, 1);
    }

    #[test]
    fn miss_increments_counter() {
        let c = cache(10);
        assert_eq!(c.get("missing"), None);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn scenario_s1_lru_eviction() {
        let c = cache(3);
        c.put("a", 1);
        c.put("b", 2);
        c.put("c", 3);
        assert_eq!(c.get("a"), Some(1));
        c.put("d", 4);
        assert_eq!(c.get("b"), None);
        let keys: Vec<String> = c.scan_entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["c", "a", "d"]);
    }

    #[test]
    fn eviction_is_exactly_one_entry_at_capacity() {
        let c = cache(2);
        c.put("a", 1);
        c.put("b", 2);
        let before = c.stats().evictions;
        c.put("c", 3);
        assert_eq!(c.stats().evictions - before, 1);
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn scenario_s2_ttl_expiry() {
        let c = SmartCache::new(
            "ttl",
            CacheConfig {
                max_size: 10,
                ttl_seconds: 1,
                ..CacheConfig::default()
            },
        )
        .unwrap();
        c.put("k", "v");
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(c.get("k"), None);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn scenario_s3_l2_promotion() {
        let c = SmartCache::new(
            "tiered",
            CacheConfig {
                max_size: 1,
                ttl_seconds: 3600,
                tiering: Some(TieringConfig {
                    l2_max_size: 2,
                    l2_ttl_seconds: 3600,
                }),
                ..CacheConfig::default()
            },
        )
        .unwrap();
        c.put("a", 1);
        c.put("b", 2);
        c.put("c", 3);
        assert_eq!(c.size(), 1);
        assert_eq!(c.scan_entries()[0].0, "c");
        assert_eq!(c.get("a"), Some(1));
        assert_eq!(c.size(), 1);
        assert_eq!(c.scan_entries()[0].0, "a");
    }

    #[test]
    fn pressure_adjustment_is_monotone() {
        let c = cache(100);
        for i in 0..50 {
            c.put(format!("k{i}"), i);
        }
        c.adjust_for_memory_pressure(0.2);
        let low = c.dynamic_max_size();
        c.adjust_for_memory_pressure(0.9);
        let high = c.dynamic_max_size();
        assert!(high < low);
    }

    #[test]
    fn pressure_adjustment_evicts_down_to_new_cap() {
        let c = cache(10);
        for i in 0..10 {
            c.put(format!("k{i}"), i);
        }
        c.adjust_for_memory_pressure(0.9);
        assert!(c.size() <= c.dynamic_max_size());
    }

    #[test]
    fn weak_map_cleanup_reclaims_dropped_objects() {
        let c = cache(10);
        {
            let obj: Arc<dyn Any + Send + Sync> = Arc::new(42u64);
            c.put_tracked("a", 1, obj);
        }
        let reclaimed = c.perform_weak_map_cleanup(Duration::from_secs(0));
        assert_eq!(reclaimed, 1);
    }

    #[test]
    fn remove_is_observable() {
        let c = cache(10);
        c.put("a", 1);
        assert!(c.remove("a"));
        assert_eq!(c.get("a"), None);
    }

    #[test]
    fn clear_empties_cache() {
        let c = cache(10);
        c.put("a", 1);
        c.put("b", 2);
        c.clear();
        assert_eq!(c.size(), 0);
    }
}
