//! Threshold monitoring
//!
//! Each snapshot is checked against the configured ceilings. Breaches are
//! recorded and logged as warnings; they never stop or alter sampling.

use serde::Serialize;
use tracing::warn;

use super::MemorySnapshot;
use crate::config::MemoryThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ThresholdKind {
    HeapUsage,
    RssUsage,
    ExternalUsage,
    GrowthRate,
}

/// One observed breach of a configured ceiling. Purely advisory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdViolation {
    pub kind: ThresholdKind,
    pub timestamp_ms: i64,
    pub observed: f64,
    pub threshold: f64,
}

#[derive(Debug)]
pub struct ThresholdMonitor {
    thresholds: MemoryThresholds,
}

impl ThresholdMonitor {
    pub fn new(thresholds: MemoryThresholds) -> Self {
        Self { thresholds }
    }

    /// Check one snapshot against every ceiling. Growth rate is compared by
    /// magnitude, so rapid shrinking is flagged too.
    pub fn check(&self, snapshot: &MemorySnapshot) -> Vec<ThresholdViolation> {
        let mut violations = Vec::new();

        if snapshot.heap_used_bytes > self.thresholds.heap_used_bytes {
            warn!(
                observed_bytes = snapshot.heap_used_bytes,
                threshold_bytes = self.thresholds.heap_used_bytes,
                "heap usage above threshold"
            );
            violations.push(ThresholdViolation {
                kind: ThresholdKind::HeapUsage,
                timestamp_ms: snapshot.timestamp_ms,
                observed: snapshot.heap_used_bytes as f64,
                threshold: self.thresholds.heap_used_bytes as f64,
            });
        }

        if snapshot.rss_bytes > self.thresholds.rss_bytes {
            warn!(
                observed_bytes = snapshot.rss_bytes,
                threshold_bytes = self.thresholds.rss_bytes,
                "resident set size above threshold"
            );
            violations.push(ThresholdViolation {
                kind: ThresholdKind::RssUsage,
                timestamp_ms: snapshot.timestamp_ms,
                observed: snapshot.rss_bytes as f64,
                threshold: self.thresholds.rss_bytes as f64,
            });
        }

        if snapshot.external_bytes > self.thresholds.external_bytes {
            warn!(
                observed_bytes = snapshot.external_bytes,
                threshold_bytes = self.thresholds.external_bytes,
                "external memory above threshold"
            );
            violations.push(ThresholdViolation {
                kind: ThresholdKind::ExternalUsage,
                timestamp_ms: snapshot.timestamp_ms,
                observed: snapshot.external_bytes as f64,
                threshold: self.thresholds.external_bytes as f64,
            });
        }

        if snapshot.heap_growth_rate_bytes_per_sec.abs() > self.thresholds.growth_rate_bytes_per_sec
        {
            warn!(
                observed_bytes_per_sec = snapshot.heap_growth_rate_bytes_per_sec,
                threshold_bytes_per_sec = self.thresholds.growth_rate_bytes_per_sec,
                "heap growth rate above threshold"
            );
            violations.push(ThresholdViolation {
                kind: ThresholdKind::GrowthRate,
                timestamp_ms: snapshot.timestamp_ms,
                observed: snapshot.heap_growth_rate_bytes_per_sec,
                threshold: self.thresholds.growth_rate_bytes_per_sec,
            });
        }

        violations
    }
}
