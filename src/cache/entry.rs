use std::time::{Duration, Instant};

/// A single cached value plus the bookkeeping the smart cache needs for
/// TTL expiry, recency ordering and adaptive-TTL access-rate estimation.
///
/// Invariant: `last_accessed >= created_at`.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
    /// Absolute deadline, used by query-result entries in preference to the
    /// cache-wide TTL. `None` means "use the owning cache's TTL".
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: V, expires_at: Instant) -> Self {
        let mut entry = Self::new(value);
        entry.expires_at = Some(expires_at);
        entry
    }

    pub fn mark_accessed(&mut self) {
        self.last_accessed = Instant::now();
        self.access_count += 1;
    }

    /// Resets creation/access bookkeeping as if the entry had just been put,
    /// keeping the previous `expires_at` semantics (§4.1 "Put semantics":
    /// overwriting a key resets counters).
    pub fn reset(&mut self, value: V) {
        let now = Instant::now();
        self.value = value;
        self.created_at = now;
        self.last_accessed = now;
        self.access_count = 0;
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => Instant::now().duration_since(self.created_at) > ttl,
        }
    }

    /// Accesses per second since creation, used by adaptive TTL. Avoids a
    /// divide-by-zero on freshly created entries by flooring the elapsed
    /// time at one second.
    pub fn access_rate_per_sec(&self) -> f64 {
        let elapsed = Instant::now()
            .duration_since(self.created_at)
            .as_secs_f64()
            .max(1.0);
        self.access_count as f64 / elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_has_equal_timestamps() {
        let entry = CacheEntry::new(42);
        assert_eq!(entry.created_at, entry.last_accessed);
        assert_eq!(entry.access_count, 0);
    }

    #[test]
    fn mark_accessed_advances_counters() {
        let mut entry = CacheEntry::new("v");
        let created = entry.created_at;
        entry.mark_accessed();
        assert_eq!(entry.access_count, 1);
        assert!(entry.last_accessed >= created);
    }

    #[test]
    fn expires_after_ttl_without_explicit_deadline() {
        let entry = CacheEntry::new(1);
        assert!(!entry.is_expired(Duration::from_secs(60)));
        assert!(entry.is_expired(Duration::from_secs(0)));
    }

    #[test]
    fn explicit_expiry_overrides_ttl() {
        let past = Instant::now() - Duration::from_secs(1);
        let entry = CacheEntry::with_expiry(1, past);
        assert!(entry.is_expired(Duration::from_secs(3600)));
    }

    #[test]
    fn reset_clears_access_count() {
        let mut entry = CacheEntry::new(1);
        entry.mark_accessed();
        entry.mark_accessed();
        entry.reset(2);
        assert_eq!(entry.value, 2);
        assert_eq!(entry.access_count, 0);
    }
}
