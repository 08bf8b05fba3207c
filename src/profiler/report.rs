//! Memory report generation
//!
//! Assembles the final report from the accumulated snapshot and GC event
//! series: run summary, per-metric statistics, leak verdict, GC summary,
//! the recent violation tail, and rule-based recommendations. Persists as
//! pretty-printed JSON and renders a short text summary for stdout.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use super::gc::GcEvent;
use super::leak::{self, LeakVerdict};
use super::stats::{compute_stats, SeriesStats};
use super::thresholds::ThresholdViolation;
use super::MemorySnapshot;
use crate::config::ProfilerConfig;

/// Raw snapshot tail carried in the report
pub const MAX_REPORT_SNAPSHOTS: usize = 100;
/// Violation tail carried in the report
pub const MAX_REPORT_VIOLATIONS: usize = 20;
/// Average GC pause above this earns a tuning recommendation
pub const GC_PAUSE_WARN_MS: f64 = 100.0;

/// Whole-run aggregates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub started_at_ms: i64,
    pub duration_ms: u64,
    pub total_measurements: usize,
    /// First-to-last snapshot deltas
    pub heap_growth_bytes: i64,
    pub rss_growth_bytes: i64,
    pub heap_growth_rate_bytes_per_sec: f64,
    pub peak_heap_bytes: u64,
    pub peak_rss_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatistics {
    pub heap_used: SeriesStats,
    pub rss: SeriesStats,
    pub external: SeriesStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GcSummary {
    Available {
        count: usize,
        avg_pause_ms: f64,
        total_heap_freed_bytes: i64,
        total_rss_freed_bytes: i64,
    },
    Unavailable {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// One remediation suggestion produced by an independent rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub category: String,
    pub priority: Priority,
    pub issue: String,
    pub suggestions: Vec<String>,
}

/// The full persisted report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryReport {
    pub generated_at_ms: i64,
    pub summary: RunSummary,
    pub statistics: ReportStatistics,
    pub leak: LeakVerdict,
    pub gc: GcSummary,
    pub violations: Vec<ThresholdViolation>,
    pub recommendations: Vec<Recommendation>,
    pub snapshots: Vec<MemorySnapshot>,
    pub gc_events: Vec<GcEvent>,
}

pub(crate) fn build(
    config: &ProfilerConfig,
    started_at_ms: i64,
    run_elapsed_ms: u64,
    snapshots: Vec<MemorySnapshot>,
    gc_events: Vec<GcEvent>,
    mut violations: Vec<ThresholdViolation>,
    gc_hook_installed: bool,
) -> MemoryReport {
    let heap_series: Vec<f64> = snapshots.iter().map(|s| s.heap_used_bytes as f64).collect();
    let rss_series: Vec<f64> = snapshots.iter().map(|s| s.rss_bytes as f64).collect();
    let external_series: Vec<f64> = snapshots.iter().map(|s| s.external_bytes as f64).collect();

    let statistics = ReportStatistics {
        heap_used: compute_stats(&heap_series),
        rss: compute_stats(&rss_series),
        external: compute_stats(&external_series),
    };

    let (heap_growth_bytes, rss_growth_bytes, heap_growth_rate_bytes_per_sec) =
        match (snapshots.first(), snapshots.last()) {
            (Some(first), Some(last)) if snapshots.len() > 1 => {
                let heap = last.heap_used_bytes as i64 - first.heap_used_bytes as i64;
                let rss = last.rss_bytes as i64 - first.rss_bytes as i64;
                let secs = last.elapsed_ms.saturating_sub(first.elapsed_ms) as f64 / 1000.0;
                let rate = if secs > 0.0 { heap as f64 / secs } else { 0.0 };
                (heap, rss, rate)
            }
            _ => (0, 0, 0.0),
        };

    let summary = RunSummary {
        started_at_ms,
        duration_ms: run_elapsed_ms,
        total_measurements: snapshots.len(),
        heap_growth_bytes,
        rss_growth_bytes,
        heap_growth_rate_bytes_per_sec,
        peak_heap_bytes: snapshots.iter().map(|s| s.heap_used_bytes).max().unwrap_or(0),
        peak_rss_bytes: snapshots.iter().map(|s| s.rss_bytes).max().unwrap_or(0),
    };

    let verdict = leak::detect_leak(&snapshots);

    let gc = if gc_hook_installed {
        let count = gc_events.len();
        let avg_pause_ms = if count > 0 {
            gc_events.iter().map(|e| e.duration_ms).sum::<f64>() / count as f64
        } else {
            0.0
        };
        GcSummary::Available {
            count,
            avg_pause_ms,
            total_heap_freed_bytes: gc_events.iter().map(|e| e.heap_freed_bytes).sum(),
            total_rss_freed_bytes: gc_events.iter().map(|e| e.rss_freed_bytes).sum(),
        }
    } else {
        GcSummary::Unavailable {
            message: "GC monitoring not available".to_string(),
        }
    };

    let recommendations = build_recommendations(config, &statistics, &summary, &verdict, &gc);

    let violation_tail_start = violations.len().saturating_sub(MAX_REPORT_VIOLATIONS);
    let violations = violations.split_off(violation_tail_start);

    let snapshot_tail_start = snapshots.len().saturating_sub(MAX_REPORT_SNAPSHOTS);
    let snapshots = snapshots[snapshot_tail_start..].to_vec();

    MemoryReport {
        generated_at_ms: chrono::Utc::now().timestamp_millis(),
        summary,
        statistics,
        leak: verdict,
        gc,
        violations,
        recommendations,
        snapshots,
        gc_events,
    }
}

/// Independent boolean rules; more than one can fire for the same run.
fn build_recommendations(
    config: &ProfilerConfig,
    statistics: &ReportStatistics,
    summary: &RunSummary,
    verdict: &LeakVerdict,
    gc: &GcSummary,
) -> Vec<Recommendation> {
    let thresholds = &config.thresholds;
    let mut recommendations = Vec::new();

    if statistics.heap_used.max > thresholds.heap_used_bytes as f64 {
        recommendations.push(Recommendation {
            category: "Memory Usage".to_string(),
            priority: Priority::High,
            issue: format!(
                "Peak heap usage {} exceeded the {} threshold",
                format_bytes(statistics.heap_used.max as u64),
                format_bytes(thresholds.heap_used_bytes),
            ),
            suggestions: vec![
                "Profile allocation hot spots and shrink the largest working sets".to_string(),
                "Bound in-memory caches and queues, or add eviction".to_string(),
                "Stream large payloads instead of buffering them whole".to_string(),
            ],
        });
    }

    if summary.heap_growth_rate_bytes_per_sec > thresholds.growth_rate_bytes_per_sec {
        recommendations.push(Recommendation {
            category: "Memory Growth".to_string(),
            priority: Priority::Medium,
            issue: format!(
                "Heap grew at {}/s over the run, above the {}/s threshold",
                format_bytes(summary.heap_growth_rate_bytes_per_sec as u64),
                format_bytes(thresholds.growth_rate_bytes_per_sec as u64),
            ),
            suggestions: vec![
                "Check for collections that accumulate without pruning".to_string(),
                "Verify subscriptions and listeners are dropped when done".to_string(),
            ],
        });
    }

    if verdict.detected {
        recommendations.push(Recommendation {
            category: "Memory Leak".to_string(),
            priority: Priority::Critical,
            issue: format!(
                "Sustained heap growth at {}/s across {} samples (heuristic verdict)",
                format_bytes(verdict.avg_growth_rate_bytes_per_sec as u64),
                verdict.window_samples,
            ),
            suggestions: vec![
                "Capture heap snapshots at intervals and diff retained objects".to_string(),
                "Audit long-lived registries and maps for entries never removed".to_string(),
                "Re-run with a longer window to confirm the trend".to_string(),
            ],
        });
    }

    if let GcSummary::Available { avg_pause_ms, .. } = gc {
        if *avg_pause_ms > GC_PAUSE_WARN_MS {
            recommendations.push(Recommendation {
                category: "GC Tuning".to_string(),
                priority: Priority::Medium,
                issue: format!(
                    "Average reclamation pause {:.1}ms exceeds {:.0}ms",
                    avg_pause_ms, GC_PAUSE_WARN_MS,
                ),
                suggestions: vec![
                    "Reclaim smaller batches more often".to_string(),
                    "Move reclamation off the latency-critical path".to_string(),
                ],
            });
        }
    }

    if statistics.external.max > thresholds.external_bytes as f64 {
        recommendations.push(Recommendation {
            category: "External Memory".to_string(),
            priority: Priority::Medium,
            issue: format!(
                "Peak external memory {} exceeded the {} threshold",
                format_bytes(statistics.external.max as u64),
                format_bytes(thresholds.external_bytes),
            ),
            suggestions: vec![
                "Audit native buffers and memory-mapped regions".to_string(),
                "Release I/O buffers promptly after use".to_string(),
            ],
        });
    }

    recommendations
}

impl MemoryReport {
    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report file
    pub fn persist(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Short text summary for stdout at exit
    pub fn text_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!(
            "=== Memory Profile Report ===\n\
             Duration: {:.1}s\n\
             Measurements: {}\n",
            self.summary.duration_ms as f64 / 1000.0,
            self.summary.total_measurements,
        ));

        summary.push_str(&format!(
            "Heap growth: {} ({}/s)\n\
             RSS growth: {}\n\
             Peak heap: {}, peak RSS: {}\n",
            format_signed_bytes(self.summary.heap_growth_bytes),
            format_signed_bytes(self.summary.heap_growth_rate_bytes_per_sec as i64),
            format_signed_bytes(self.summary.rss_growth_bytes),
            format_bytes(self.summary.peak_heap_bytes),
            format_bytes(self.summary.peak_rss_bytes),
        ));

        summary.push_str(&format!(
            "Leak suspected: {} (heuristic, not a proof)\n",
            if self.leak.detected { "YES" } else { "no" },
        ));

        match &self.gc {
            GcSummary::Available {
                count,
                avg_pause_ms,
                total_heap_freed_bytes,
                ..
            } => {
                summary.push_str(&format!(
                    "GC: {} collections, avg pause {:.1}ms, heap freed {}\n",
                    count,
                    avg_pause_ms,
                    format_signed_bytes(*total_heap_freed_bytes),
                ));
            }
            GcSummary::Unavailable { message } => {
                summary.push_str(&format!("GC: {}\n", message));
            }
        }

        summary.push_str(&format!("Threshold violations: {}\n", self.violations.len()));

        if self.recommendations.is_empty() {
            summary.push_str("Recommendations: none\n");
        } else {
            let categories: Vec<&str> = self
                .recommendations
                .iter()
                .map(|r| r.category.as_str())
                .collect();
            summary.push_str(&format!("Recommendations: {}\n", categories.join(", ")));
        }

        summary
    }
}

/// Helper to format bytes as human-readable
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Signed variant for growth figures
pub fn format_signed_bytes(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format!("+{}", format_bytes(bytes as u64))
    }
}
