//! Multi-Region Cache Manager (C2): composes Smart Caches into named
//! regions, routes invalidation by operation kind and table, and implements
//! query-result caching keyed by a SQL+parameter fingerprint.

pub mod fingerprint;
pub mod invalidation;
pub mod policy;
pub mod region;
pub mod table_extract;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CacheConfig, CacheStats, SmartCache};
use crate::error::{DbOpsError, Result};
use crate::pressure::PressureObserver;

pub use fingerprint::{fingerprint, DEFAULT_MAX_KEY_LENGTH};
pub use invalidation::InvalidationKind;
pub use policy::{CacheabilityPolicy, QueryKind};
pub use region::Region;
pub use table_extract::extract_tables;

/// Metadata recorded alongside a cached query result (§3 "Query Cache
/// Entry"). Timestamps and access counts live on the owning
/// [`crate::cache::CacheEntry`] rather than being duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub kind: QueryKind,
    pub tables: Vec<String>,
    pub complexity_score: u32,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryCacheData {
    pub data: serde_json::Value,
    pub metadata: QueryMetadata,
}

/// Uniform value type stored in every region so a single generic
/// [`SmartCache`] type parameter can back all four regions (§4.2
/// `get(region,key)`/`set(region,key,value)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CachedValue {
    Json(serde_json::Value),
    Bool(bool),
    Query(QueryCacheData),
}

impl CachedValue {
    pub fn as_query(&self) -> Option<&QueryCacheData> {
        match self {
            CachedValue::Query(q) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    pub schema_cache: CacheConfig,
    pub table_exists_cache: CacheConfig,
    pub index_cache: CacheConfig,
    pub query_cache: CacheConfig,
    pub query_cache_enabled: bool,
    pub max_result_size_bytes: usize,
    pub max_key_length: usize,
    pub policy: CacheabilityPolicy,
    pub cleanup_min_interval: Duration,
    pub weak_cleanup_min_interval: Duration,
}

impl Default for CacheManagerConfig {
    fn default() -> Self {
        Self {
            schema_cache: CacheConfig::default(),
            table_exists_cache: CacheConfig::default(),
            index_cache: CacheConfig::default(),
            query_cache: CacheConfig::default(),
            query_cache_enabled: true,
            max_result_size_bytes: 1024 * 1024,
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            policy: CacheabilityPolicy::default(),
            cleanup_min_interval: Duration::from_secs(30),
            weak_cleanup_min_interval: Duration::from_secs(60),
        }
    }
}

impl CacheManagerConfig {
    pub fn validate(&self) -> Result<()> {
        self.schema_cache.validate()?;
        self.table_exists_cache.validate()?;
        self.index_cache.validate()?;
        self.query_cache.validate()?;
        if self.max_result_size_bytes == 0 {
            return Err(DbOpsError::Configuration(
                "max_result_size_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheManagerStats {
    pub schema: CacheStats,
    pub table_exists: CacheStats,
    pub index: CacheStats,
    pub query_result: CacheStats,
    pub query_kind_tally: HashMap<String, u64>,
    pub query_hits: u64,
    pub query_misses: u64,
    pub skipped_non_cacheable: u64,
    pub invalidations_total: u64,
}

impl fmt::Display for CacheManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "cache manager summary")?;
        writeln!(f, "  schema:       {}", self.schema)?;
        writeln!(f, "  table_exists: {}", self.table_exists)?;
        writeln!(f, "  index:        {}", self.index)?;
        writeln!(f, "  query_result: {}", self.query_result)?;
        writeln!(
            f,
            "  query cache hits={} misses={} skipped={} invalidations={}",
            self.query_hits, self.query_misses, self.skipped_non_cacheable, self.invalidations_total
        )
    }
}

fn estimate_size(value: &serde_json::Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

fn complexity_score(sql: &str) -> u32 {
    let upper = sql.to_uppercase();
    let mut score = 1u32;
    for keyword in ["JOIN", "WHERE", "GROUP BY", "ORDER BY", "UNION", "HAVING", "DISTINCT"] {
        score += upper.matches(keyword).count() as u32;
    }
    score += upper.matches('(').count() as u32;
    score
}

fn scale_interval(base: Duration, pressure: f64) -> Duration {
    let factor = (1.0 - pressure.clamp(0.0, 1.0)).max(0.1);
    base.mul_f64(factor)
}

fn scale_batch_size(pressure: f64) -> usize {
    (50.0 + pressure.clamp(0.0, 1.0) * 250.0) as usize
}

/// Composes the four named regions into one facade (§4.2).
pub struct CacheManager {
    schema: Arc<SmartCache<CachedValue>>,
    table_exists: Arc<SmartCache<CachedValue>>,
    index: Arc<SmartCache<CachedValue>>,
    query_result: Arc<SmartCache<CachedValue>>,
    config: RwLock<CacheManagerConfig>,
    stats: Mutex<CacheManagerStats>,
    current_pressure: Mutex<f64>,
    last_query_cleanup: Mutex<Instant>,
}

impl CacheManager {
    pub fn new(config: CacheManagerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let schema = SmartCache::new("schema", config.schema_cache.clone())?;
        let table_exists = SmartCache::new("table_exists", config.table_exists_cache.clone())?;
        let index = SmartCache::new("index", config.index_cache.clone())?;
        let query_result = SmartCache::new("query_result", config.query_cache.clone())?;
        Ok(Arc::new(Self {
            schema,
            table_exists,
            index,
            query_result,
            config: RwLock::new(config),
            stats: Mutex::new(CacheManagerStats::default()),
            current_pressure: Mutex::new(0.0),
            last_query_cleanup: Mutex::new(Instant::now()),
        }))
    }

    fn cache_for(&self, region: Region) -> &Arc<SmartCache<CachedValue>> {
        match region {
            Region::Schema => &self.schema,
            Region::TableExists => &self.table_exists,
            Region::Index => &self.index,
            Region::QueryResult => &self.query_result,
        }
    }

    pub fn get(&self, region: Region, key: &str) -> Option<CachedValue> {
        self.cache_for(region).get(key)
    }

    pub fn set(&self, region: Region, key: impl Into<String>, value: CachedValue) {
        self.cache_for(region).put(key, value);
    }

    pub fn remove(&self, region: Region, key: &str) -> bool {
        self.cache_for(region).remove(key)
    }

    pub fn has(&self, region: Region, key: &str) -> bool {
        self.cache_for(region).contains_live(key)
    }

    pub fn clear_region(&self, region: Region) {
        self.cache_for(region).clear();
    }

    pub fn clear_all(&self) {
        for region in Region::LOCK_ORDER {
            self.cache_for(region).clear();
        }
    }

    pub fn get_batch(&self, region: Region, keys: &[String]) -> HashMap<String, CachedValue> {
        let cache = self.cache_for(region);
        keys.iter()
            .filter_map(|k| cache.get(k).map(|v| (k.clone(), v)))
            .collect()
    }

    pub fn set_batch(&self, region: Region, entries: Vec<(String, CachedValue)>) {
        let cache = self.cache_for(region);
        for (key, value) in entries {
            cache.put(key, value);
        }
    }

    pub fn get_stats(&self, region: Region) -> CacheStats {
        self.cache_for(region).stats()
    }

    pub fn get_all_stats(&self) -> CacheManagerStats {
        let mut stats = self.stats.lock().clone();
        stats.schema = self.schema.stats();
        stats.table_exists = self.table_exists.stats();
        stats.index = self.index.stats();
        stats.query_result = self.query_result.stats();
        stats
    }

    fn tally_kind(&self, kind: QueryKind) {
        let key = format!("{kind:?}");
        *self.stats.lock().query_kind_tally.entry(key).or_insert(0) += 1;
    }

    pub fn get_cached_query(&self, sql: &str, params: Option<&serde_json::Value>) -> Option<serde_json::Value> {
        let config = self.config.read();
        if !config.query_cache_enabled {
            return None;
        }
        let kind = QueryKind::infer(sql);
        self.tally_kind(kind);
        if !config.policy.is_cacheable(kind, sql) {
            self.stats.lock().skipped_non_cacheable += 1;
            return None;
        }
        let key = fingerprint(sql, params, config.max_key_length);
        drop(config);
        match self.query_result.get(&key) {
            Some(CachedValue::Query(data)) => {
                self.stats.lock().query_hits += 1;
                Some(data.data)
            }
            _ => {
                self.stats.lock().query_misses += 1;
                None
            }
        }
    }

    pub fn set_cached_query(
        &self,
        sql: &str,
        params: Option<&serde_json::Value>,
        result: serde_json::Value,
    ) -> bool {
        let config = self.config.read();
        if !config.query_cache_enabled {
            return false;
        }
        let kind = QueryKind::infer(sql);
        if !config.policy.is_cacheable(kind, sql) {
            return false;
        }
        let size = estimate_size(&result);
        if size > config.max_result_size_bytes {
            return false;
        }
        let ttl = config.policy.ttl_seconds_for(kind);
        let key = fingerprint(sql, params, config.max_key_length);
        let tables = extract_tables(sql);
        let metadata = QueryMetadata {
            kind,
            tables,
            complexity_score: complexity_score(sql),
            size_bytes: size,
        };
        let expires_at = Instant::now() + Duration::from_secs(ttl);
        drop(config);
        self.query_result.put_with_expiry(
            key,
            CachedValue::Query(QueryCacheData { data: result, metadata }),
            expires_at,
        );
        true
    }

    /// Invalidates by operation kind and optional table name (§4.2
    /// "Invalidation policy"), walking affected regions in the fixed lock
    /// order SCHEMA → TABLE_EXISTS → INDEX → QUERY_RESULT.
    pub fn invalidate_cache(&self, kind: InvalidationKind, table: Option<&str>) {
        match invalidation::plan(kind, table) {
            invalidation::InvalidationPlan::ClearAll => self.clear_all(),
            invalidation::InvalidationPlan::ClearQueryResult => self.query_result.clear(),
            invalidation::InvalidationPlan::TableInRegions { table, regions } => {
                for region in Region::LOCK_ORDER {
                    if regions.contains(&region) {
                        self.cache_for(region).remove(&table.to_lowercase());
                    }
                }
                self.invalidate_query_cache_by_table(&table);
            }
        }
        self.stats.lock().invalidations_total += 1;
    }

    /// Scans `QUERY_RESULT` and deletes every entry whose metadata lists
    /// `table`. Scan and delete are infallible in this implementation (no
    /// I/O, no external calls), so the scan-or-delete-failure fallback of
    /// clearing the whole region named in §4.2 has no reachable trigger
    /// here; it would be wired in if `scan_entries`/`remove` ever became
    /// fallible.
    pub fn invalidate_query_cache_by_table(&self, name: &str) {
        let name = name.to_lowercase();
        for (key, entry) in self.query_result.scan_entries() {
            if let CachedValue::Query(data) = &entry.value {
                if data.metadata.tables.iter().any(|t| t == &name) {
                    self.query_result.remove(&key);
                }
            }
        }
    }

    /// Opportunistic, rate-limited sweep of expired `QUERY_RESULT` entries
    /// (§4.2 "Expiry sweep"). Returns the number removed.
    pub fn cleanup_expired_query_entries(&self) -> usize {
        let pressure = *self.current_pressure.lock();
        let min_interval = {
            let config = self.config.read();
            scale_interval(config.cleanup_min_interval, pressure)
        };
        {
            let mut last = self.last_query_cleanup.lock();
            if last.elapsed() < min_interval {
                return 0;
            }
            *last = Instant::now();
        }
        let batch_size = scale_batch_size(pressure);
        let mut removed = 0;
        for (key, entry) in self.query_result.scan_entries() {
            if removed >= batch_size {
                break;
            }
            if self.query_result.is_entry_expired(&entry) {
                self.query_result.remove(&key);
                removed += 1;
            }
        }
        debug!(removed, batch_size, "expired query cache sweep");
        removed
    }

    /// `adjustForMemoryPressure`: applied to every region.
    pub fn adjust_for_memory_pressure(&self, level: f64) {
        for region in Region::LOCK_ORDER {
            self.cache_for(region).adjust_for_memory_pressure(level);
        }
    }

    pub fn perform_weak_map_cleanup(&self) -> usize {
        let pressure = *self.current_pressure.lock();
        let min_interval = {
            let config = self.config.read();
            scale_interval(config.weak_cleanup_min_interval, pressure)
        };
        Region::LOCK_ORDER
            .iter()
            .map(|region| self.cache_for(*region).perform_weak_map_cleanup(min_interval))
            .sum()
    }

    /// `onPressureChange(p)`: cache the value; if `p > 0.8`, adjust every
    /// region (§4.2 "Pressure callback").
    fn handle_pressure(&self, p: f64) {
        *self.current_pressure.lock() = p;
        if p > 0.8 {
            self.adjust_for_memory_pressure(p);
        }
    }
}

#[async_trait::async_trait]
impl PressureObserver for CacheManager {
    async fn on_pressure_change(&self, pressure: f64) {
        self.handle_pressure(pressure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> Arc<CacheManager> {
        CacheManager::new(CacheManagerConfig::default()).unwrap()
    }

    #[test]
    fn scenario_s4_ddl_invalidation() {
        let mgr = manager();
        mgr.set_cached_query("SELECT * FROM users", None, json!([{"id": 1}]));
        assert!(mgr.get_cached_query("SELECT * FROM users", None).is_some());
        mgr.invalidate_cache(InvalidationKind::Ddl, Some("users"));
        assert!(mgr.get_cached_query("SELECT * FROM users", None).is_none());
    }

    #[test]
    fn property_9_fingerprint_is_whitespace_and_case_insensitive() {
        let mgr = manager();
        mgr.set_cached_query("SELECT * FROM users", None, json!([1]));
        let hit = mgr.get_cached_query("select   *   FROM   USERS", None);
        assert_eq!(hit, Some(json!([1])));
    }

    #[test]
    fn mutations_are_never_cached() {
        let mgr = manager();
        assert!(!mgr.set_cached_query("INSERT INTO users VALUES (1)", None, json!({"ok": true})));
    }

    #[test]
    fn oversized_results_are_rejected() {
        let mut config = CacheManagerConfig::default();
        config.max_result_size_bytes = 4;
        let mgr = CacheManager::new(config).unwrap();
        assert!(!mgr.set_cached_query("SELECT * FROM t", None, json!([1, 2, 3, 4, 5])));
    }

    #[test]
    fn ddl_without_table_clears_every_region() {
        let mgr = manager();
        mgr.set(Region::Schema, "users", CachedValue::Json(json!({"cols": []})));
        mgr.invalidate_cache(InvalidationKind::Drop, None);
        assert!(mgr.get(Region::Schema, "users").is_none());
    }

    #[test]
    fn table_specific_invalidation_without_table_clears_query_result_only() {
        let mgr = manager();
        mgr.set_cached_query("SELECT * FROM t", None, json!([1]));
        mgr.set(Region::Schema, "t", CachedValue::Json(json!({})));
        mgr.invalidate_cache(InvalidationKind::Update, None);
        assert!(mgr.get_cached_query("SELECT * FROM t", None).is_none());
        assert!(mgr.get(Region::Schema, "t").is_some());
    }

    #[test]
    fn pressure_callback_adjusts_regions_above_threshold() {
        let mgr = manager();
        for i in 0..10 {
            mgr.set(Region::Schema, format!("t{i}"), CachedValue::Bool(true));
        }
        let before = mgr.get_stats(Region::Schema).dynamic_max_size;
        mgr.handle_pressure(0.9);
        let after = mgr.get_stats(Region::Schema).dynamic_max_size;
        assert!(after < before);
    }

    #[test]
    fn pressure_at_or_below_threshold_does_not_adjust() {
        let mgr = manager();
        let before = mgr.get_stats(Region::Schema).dynamic_max_size;
        mgr.handle_pressure(0.5);
        let after = mgr.get_stats(Region::Schema).dynamic_max_size;
        assert_eq!(before, after);
    }

    #[test]
    fn expired_query_entries_are_swept() {
        let mut config = CacheManagerConfig::default();
        config.policy.ttl_by_kind.insert(QueryKind::Select, 1);
        config.cleanup_min_interval = Duration::from_millis(0);
        let mgr = CacheManager::new(config).unwrap();
        mgr.set_cached_query("SELECT * FROM t", None, json!([1]));
        std::thread::sleep(Duration::from_millis(1100));
        let removed = mgr.cleanup_expired_query_entries();
        assert_eq!(removed, 1);
    }
}
