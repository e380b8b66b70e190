use std::fmt;

use serde::{Deserialize, Serialize};

/// Reason an entry left a [`crate::cache::SmartCache`], tracked per-reason
/// so operators can tell capacity pressure apart from plain expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    CapacityLimit,
    Expired,
    Explicit,
    MemoryPressure,
    DemotedToL2,
}

/// Point-in-time hit/miss/eviction counters for one cache instance.
///
/// Grounded on the teacher's `cache::cache_statistics::CacheMetrics`; kept
/// deliberately flat (plain counters, no histogram) so a single critical
/// section can update it in O(1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub evictions_by_reason: EvictionCounts,
    pub l2_hits: u64,
    pub l2_promotions: u64,
    pub l2_demotions: u64,
    pub expired_removed: u64,
    pub weak_refs_reclaimed: u64,
    pub prefetch_attempts: u64,
    pub prefetch_failures: u64,
    pub current_size: usize,
    pub dynamic_max_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvictionCounts {
    pub capacity_limit: u64,
    pub expired: u64,
    pub explicit: u64,
    pub memory_pressure: u64,
    pub demoted_to_l2: u64,
}

impl CacheStats {
    pub fn record_eviction(&mut self, reason: EvictionReason) {
        self.evictions += 1;
        match reason {
            EvictionReason::CapacityLimit => self.evictions_by_reason.capacity_limit += 1,
            EvictionReason::Expired => self.evictions_by_reason.expired += 1,
            EvictionReason::Explicit => self.evictions_by_reason.explicit += 1,
            EvictionReason::MemoryPressure => self.evictions_by_reason.memory_pressure += 1,
            EvictionReason::DemotedToL2 => self.evictions_by_reason.demoted_to_l2 += 1,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    pub fn reset(&mut self) {
        let current_size = self.current_size;
        let dynamic_max_size = self.dynamic_max_size;
        *self = CacheStats::default();
        self.current_size = current_size;
        self.dynamic_max_size = dynamic_max_size;
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={}/{} hits={} misses={} hit_rate={:.1}% evictions={}",
            self.current_size,
            self.dynamic_max_size,
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
        )
    }
}
