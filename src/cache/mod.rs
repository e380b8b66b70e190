//! Smart Cache (C1): a bounded, TTL-bearing, LRU-ordered store with optional
//! L1/L2 tiering, adaptive TTL and weak-reference key tracking.

pub mod config;
pub mod entry;
pub mod smart_cache;
pub mod stats;

pub use config::{AdaptiveTtlConfig, CacheConfig, PrefetchConfig, TieringConfig};
pub use entry::CacheEntry;
pub use smart_cache::{PrefetchLoader, SmartCache};
pub use stats::{CacheStats, EvictionReason};
