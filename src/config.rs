//! Profiler configuration
//!
//! Sampling cadence, run duration, report destination, and memory ceilings.
//! Everything has a serde default so a partial TOML file (or none at all)
//! still yields a usable config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Memory profiler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Sampling interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Total profiling duration in milliseconds (soft deadline)
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Where the JSON report is written at stop time
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Memory ceilings checked on every sample
    #[serde(default)]
    pub thresholds: MemoryThresholds,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_duration_ms() -> u64 {
    300_000
}

fn default_output_file() -> PathBuf {
    PathBuf::from("memory-profile-report.json")
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            duration_ms: default_duration_ms(),
            output_file: default_output_file(),
            thresholds: MemoryThresholds::default(),
        }
    }
}

impl ProfilerConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path =
            std::env::var("MEMWATCH_CONFIG_PATH").unwrap_or_else(|_| "memwatch.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default memwatch config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Memory ceilings for the threshold monitor. Breaches are warnings only and
/// never alter sampling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryThresholds {
    /// Heap usage ceiling (bytes)
    #[serde(default = "default_heap_used_bytes")]
    pub heap_used_bytes: u64,

    /// Resident set size ceiling (bytes)
    #[serde(default = "default_rss_bytes")]
    pub rss_bytes: u64,

    /// External (untracked/native) memory ceiling (bytes)
    #[serde(default = "default_external_bytes")]
    pub external_bytes: u64,

    /// Heap growth rate ceiling (bytes per second, compared by magnitude)
    #[serde(default = "default_growth_rate_bytes_per_sec")]
    pub growth_rate_bytes_per_sec: f64,
}

fn default_heap_used_bytes() -> u64 {
    524_288_000
} // 500 MB
fn default_rss_bytes() -> u64 {
    1_073_741_824
} // 1 GiB
fn default_external_bytes() -> u64 {
    104_857_600
} // 100 MiB
fn default_growth_rate_bytes_per_sec() -> f64 {
    104_857.6
} // 100 KiB/s

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            heap_used_bytes: default_heap_used_bytes(),
            rss_bytes: default_rss_bytes(),
            external_bytes: default_external_bytes(),
            growth_rate_bytes_per_sec: default_growth_rate_bytes_per_sec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProfilerConfig::default();
        assert_eq!(config.interval_ms, 1000);
        assert_eq!(config.duration_ms, 300_000);
        assert_eq!(
            config.output_file,
            PathBuf::from("memory-profile-report.json")
        );
        assert_eq!(config.thresholds.heap_used_bytes, 524_288_000);
        assert_eq!(config.thresholds.rss_bytes, 1_073_741_824);
        assert_eq!(config.thresholds.external_bytes, 104_857_600);
        assert!((config.thresholds.growth_rate_bytes_per_sec - 104_857.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ProfilerConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: ProfilerConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.interval_ms, config.interval_ms);
        assert_eq!(parsed.output_file, config.output_file);
        assert_eq!(
            parsed.thresholds.heap_used_bytes,
            config.thresholds.heap_used_bytes
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: ProfilerConfig = toml::from_str("interval_ms = 250").unwrap();
        assert_eq!(parsed.interval_ms, 250);
        assert_eq!(parsed.duration_ms, 300_000);
        assert_eq!(parsed.thresholds.external_bytes, 104_857_600);
    }
}
