use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD_BYTES: u64 = 1024 * 1024 * 1024; // 1 GB
pub const DEFAULT_SAMPLE_INTERVAL_SECONDS: u64 = 5;
pub const NOTIFY_THRESHOLD: f64 = 0.8;
pub const CLEANUP_THRESHOLD: f64 = 0.9;

/// Derived classification of the scalar pressure signal, used internally
/// for logging and as an admission-control hint. The bus's primary signal
/// stays the raw `p ∈ [0,1]` scalar (§3 "MemoryPressure").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryPressureLevel {
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl Default for MemoryPressureLevel {
    fn default() -> Self {
        MemoryPressureLevel::Normal
    }
}

impl fmt::Display for MemoryPressureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryPressureLevel::Normal => "normal",
            MemoryPressureLevel::Warning => "warning",
            MemoryPressureLevel::Critical => "critical",
            MemoryPressureLevel::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

impl MemoryPressureLevel {
    pub fn from_pressure(p: f64) -> Self {
        if p >= 0.95 {
            MemoryPressureLevel::Emergency
        } else if p >= CLEANUP_THRESHOLD {
            MemoryPressureLevel::Critical
        } else if p >= NOTIFY_THRESHOLD {
            MemoryPressureLevel::Warning
        } else {
            MemoryPressureLevel::Normal
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureConfig {
    pub threshold_bytes: u64,
    pub sample_interval_seconds: u64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_THRESHOLD_BYTES,
            sample_interval_seconds: DEFAULT_SAMPLE_INTERVAL_SECONDS,
        }
    }
}

impl PressureConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.threshold_bytes == 0 {
            return Err(crate::error::DbOpsError::Configuration(
                "threshold_bytes must be greater than zero".into(),
            ));
        }
        if self.sample_interval_seconds == 0 {
            return Err(crate::error::DbOpsError::Configuration(
                "sample_interval_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// A subscriber to pressure-level changes, expressed as a trait object
/// (the teacher's `orchestration::error_recovery::RecoveryListener` shape)
/// so observers can carry their own state without a closure capture.
#[async_trait]
pub trait PressureObserver: Send + Sync {
    async fn on_pressure_change(&self, pressure: f64);
}

/// Alternate, closure-based registration path (the teacher's
/// `memory::pressure::PressureCallback` shape), kept for parity since both
/// idioms appear across the teacher's codebase.
pub type PressureCallback =
    std::sync::Arc<dyn Fn(f64) -> futures::future::BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_thresholds_are_ordered() {
        assert!(MemoryPressureLevel::Normal < MemoryPressureLevel::Warning);
        assert!(MemoryPressureLevel::Warning < MemoryPressureLevel::Critical);
        assert!(MemoryPressureLevel::Critical < MemoryPressureLevel::Emergency);
    }

    #[test]
    fn from_pressure_classifies_correctly() {
        assert_eq!(MemoryPressureLevel::from_pressure(0.1), MemoryPressureLevel::Normal);
        assert_eq!(MemoryPressureLevel::from_pressure(0.81), MemoryPressureLevel::Warning);
        assert_eq!(MemoryPressureLevel::from_pressure(0.91), MemoryPressureLevel::Critical);
        assert_eq!(MemoryPressureLevel::from_pressure(0.96), MemoryPressureLevel::Emergency);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PressureConfig::default().validate().is_ok());
    }
}
