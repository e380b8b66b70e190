use std::fs;

use tracing::warn;

use crate::pressure::types::PressureConfig;

/// Coarse snapshot of system memory state, enough to compute the scalar
/// pressure signal. Grounded on the teacher's `memory::pressure::
/// SystemMemoryInfo::collect`, trimmed to the fields this crate's pressure
/// signal actually needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub process_rss_bytes: u64,
}

impl SystemMemoryInfo {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    #[cfg(target_os = "linux")]
    pub fn collect() -> Self {
        let mut info = Self::default();
        if let Ok(contents) = fs::read_to_string("/proc/meminfo") {
            for line in contents.lines() {
                if let Some(kb) = parse_meminfo_kb(line, "MemTotal:") {
                    info.total_bytes = kb * 1024;
                } else if let Some(kb) = parse_meminfo_kb(line, "MemAvailable:") {
                    info.available_bytes = kb * 1024;
                }
            }
        } else {
            warn!("unable to read /proc/meminfo, falling back to zeroed memory sample");
        }
        if let Ok(contents) = fs::read_to_string("/proc/self/status") {
            for line in contents.lines() {
                if let Some(kb) = parse_meminfo_kb(line, "VmRSS:") {
                    info.process_rss_bytes = kb * 1024;
                }
            }
        }
        info
    }

    #[cfg(not(target_os = "linux"))]
    pub fn collect() -> Self {
        // No portable sampler on this platform; callers fall back to the
        // bus's externally-reported pressure contributions only.
        Self::default()
    }
}

#[cfg(target_os = "linux")]
fn parse_meminfo_kb(line: &str, prefix: &str) -> Option<u64> {
    let rest = line.strip_prefix(prefix)?;
    rest.trim()
        .split_whitespace()
        .next()
        .and_then(|s| s.parse::<u64>().ok())
}

/// `p = min(1, (used + external) / threshold)` (§4.4 "Sampling").
pub fn compute_pressure(config: &PressureConfig, info: &SystemMemoryInfo, external_bytes: u64) -> f64 {
    let used = info.used_bytes().max(info.process_rss_bytes) + external_bytes;
    (used as f64 / config.threshold_bytes as f64).min(1.0)
}
