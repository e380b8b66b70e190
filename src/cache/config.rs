use serde::{Deserialize, Serialize};

use crate::error::{DbOpsError, Result};

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_TTL_SECONDS: u64 = 300;
pub const MIN_TTL_SECONDS: u64 = 1;
pub const MAX_TTL_SECONDS: u64 = 86_400;

/// Configuration for a single [`crate::cache::SmartCache`] instance.
///
/// Mirrors `CacheConfig` but adds L1/L2 tiering and adaptive-TTL knobs, all
/// optional and off by default so a plain bounded LRU+TTL cache is the
/// common case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
    pub tiering: Option<TieringConfig>,
    pub adaptive_ttl: Option<AdaptiveTtlConfig>,
    pub weak_ref_tracking: bool,
    pub prefetch: Option<PrefetchConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_ENTRIES,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            tiering: None,
            adaptive_ttl: None,
            weak_ref_tracking: false,
            prefetch: None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DbOpsError::Configuration(
                "max_size must be greater than zero".into(),
            ));
        }
        if self.ttl_seconds < MIN_TTL_SECONDS || self.ttl_seconds > MAX_TTL_SECONDS {
            return Err(DbOpsError::Configuration(format!(
                "ttl_seconds must be within [{MIN_TTL_SECONDS}, {MAX_TTL_SECONDS}]"
            )));
        }
        if let Some(t) = &self.tiering {
            t.validate()?;
        }
        if let Some(a) = &self.adaptive_ttl {
            a.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TieringConfig {
    pub l2_max_size: usize,
    pub l2_ttl_seconds: u64,
}

impl TieringConfig {
    fn validate(&self) -> Result<()> {
        if self.l2_max_size == 0 {
            return Err(DbOpsError::Configuration(
                "l2_max_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveTtlConfig {
    pub min_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    /// Multiplicative factor applied when raising or lowering the TTL.
    pub factor: f64,
    pub raise_threshold_per_sec: f64,
    pub lower_threshold_per_sec: f64,
}

impl Default for AdaptiveTtlConfig {
    fn default() -> Self {
        Self {
            min_ttl_seconds: MIN_TTL_SECONDS,
            max_ttl_seconds: MAX_TTL_SECONDS,
            factor: 1.5,
            raise_threshold_per_sec: 0.1,
            lower_threshold_per_sec: 0.01,
        }
    }
}

impl AdaptiveTtlConfig {
    fn validate(&self) -> Result<()> {
        if self.min_ttl_seconds > self.max_ttl_seconds {
            return Err(DbOpsError::Configuration(
                "min_ttl_seconds must not exceed max_ttl_seconds".into(),
            ));
        }
        if self.factor <= 1.0 {
            return Err(DbOpsError::Configuration(
                "adaptive TTL factor must be greater than 1.0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    pub min_samples: u64,
    pub hit_rate_threshold: f64,
    pub max_keys: usize,
    pub access_share_threshold: f64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            min_samples: 100,
            hit_rate_threshold: 0.5,
            max_keys: 8,
            access_share_threshold: 0.02,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_max_size_rejected() {
        let mut cfg = CacheConfig::default();
        cfg.max_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ttl_out_of_range_rejected() {
        let mut cfg = CacheConfig::default();
        cfg.ttl_seconds = MAX_TTL_SECONDS + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn adaptive_ttl_requires_factor_above_one() {
        let mut cfg = CacheConfig::default();
        cfg.adaptive_ttl = Some(AdaptiveTtlConfig {
            factor: 1.0,
            ..AdaptiveTtlConfig::default()
        });
        assert!(cfg.validate().is_err());
    }
}
