//! Leak detection heuristic
//!
//! Sliding-window check over recent snapshots: sustained positive heap
//! growth above 1 MiB/s flags a suspected leak. This is a heuristic, not a
//! proof, and the verdict says so wherever it is surfaced.

use serde::Serialize;

use super::MemorySnapshot;

/// Average growth rate above this flags a leak (1 MiB/s)
pub const GROWTH_RATE_THRESHOLD_BYTES_PER_SEC: f64 = 1_048_576.0;
/// Share of positive inter-sample rates required to flag a leak
pub const POSITIVE_RATE_RATIO_THRESHOLD: f64 = 0.70;
/// Number of trailing snapshots examined
pub const DETECTION_WINDOW: usize = 20;
/// Below this many snapshots the verdict is "insufficient data"
pub const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeakConfidence {
    High,
    Low,
}

/// Outcome of the leak heuristic over one snapshot series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakVerdict {
    pub detected: bool,
    pub confidence: LeakConfidence,
    pub avg_growth_rate_bytes_per_sec: f64,
    pub positive_rate_ratio: f64,
    pub window_samples: usize,
    pub reason: Option<String>,
}

impl LeakVerdict {
    fn insufficient(samples: usize) -> Self {
        Self {
            detected: false,
            confidence: LeakConfidence::Low,
            avg_growth_rate_bytes_per_sec: 0.0,
            positive_rate_ratio: 0.0,
            window_samples: samples,
            reason: Some("insufficient data".to_string()),
        }
    }
}

/// Run the heuristic over the full snapshot series.
///
/// Inter-sample rates use the snapshot timestamps, not the configured
/// interval, so late ticks do not inflate the growth rate.
pub fn detect_leak(snapshots: &[MemorySnapshot]) -> LeakVerdict {
    if snapshots.len() < MIN_SAMPLES {
        return LeakVerdict::insufficient(snapshots.len());
    }

    let window_start = snapshots.len().saturating_sub(DETECTION_WINDOW);
    let window = &snapshots[window_start..];

    let mut rates = Vec::with_capacity(window.len());
    for pair in window.windows(2) {
        let dt_ms = pair[1].timestamp_ms - pair[0].timestamp_ms;
        // A non-positive delta would produce an unusable rate
        if dt_ms <= 0 {
            continue;
        }
        let heap_delta = pair[1].heap_used_bytes as f64 - pair[0].heap_used_bytes as f64;
        rates.push(heap_delta / (dt_ms as f64 / 1000.0));
    }

    if rates.is_empty() {
        return LeakVerdict::insufficient(snapshots.len());
    }

    let avg_rate = rates.iter().sum::<f64>() / rates.len() as f64;
    let positive = rates.iter().filter(|r| **r > 0.0).count();
    let positive_ratio = positive as f64 / rates.len() as f64;

    let detected =
        avg_rate > GROWTH_RATE_THRESHOLD_BYTES_PER_SEC && positive_ratio > POSITIVE_RATE_RATIO_THRESHOLD;

    LeakVerdict {
        detected,
        confidence: if detected {
            LeakConfidence::High
        } else {
            LeakConfidence::Low
        },
        avg_growth_rate_bytes_per_sec: avg_rate,
        positive_rate_ratio: positive_ratio,
        window_samples: window.len(),
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(index: u64, heap_used_bytes: u64) -> MemorySnapshot {
        MemorySnapshot {
            timestamp_ms: (index * 1000) as i64,
            elapsed_ms: index * 1000,
            heap_used_bytes,
            heap_peak_bytes: heap_used_bytes,
            external_bytes: 0,
            rss_bytes: heap_used_bytes * 2,
            large_buffer_bytes: 0,
            heap_growth_bytes: 0,
            rss_growth_bytes: 0,
            heap_growth_rate_bytes_per_sec: 0.0,
        }
    }

    #[test]
    fn test_fewer_than_ten_snapshots_is_insufficient() {
        let series: Vec<_> = (0..9)
            .map(|i| snapshot(i, 100 * 1024 * 1024 + i * 10 * 1024 * 1024))
            .collect();
        let verdict = detect_leak(&series);
        assert!(!verdict.detected);
        assert_eq!(verdict.reason.as_deref(), Some("insufficient data"));
    }

    #[test]
    fn test_steady_growth_is_detected_with_high_confidence() {
        // 2 MiB every 1000 ms, well above the 1 MiB/s threshold
        let series: Vec<_> = (0..20)
            .map(|i| snapshot(i, 50 * 1024 * 1024 + i * 2 * 1024 * 1024))
            .collect();
        let verdict = detect_leak(&series);
        assert!(verdict.detected);
        assert_eq!(verdict.confidence, LeakConfidence::High);
        assert!(verdict.avg_growth_rate_bytes_per_sec > GROWTH_RATE_THRESHOLD_BYTES_PER_SEC);
        assert!(verdict.positive_rate_ratio > POSITIVE_RATE_RATIO_THRESHOLD);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn test_oscillating_heap_is_not_a_leak() {
        let base = 200 * 1024 * 1024u64;
        let series: Vec<_> = (0..20)
            .map(|i| snapshot(i, if i % 2 == 0 { base + 1024 } else { base - 1024 }))
            .collect();
        let verdict = detect_leak(&series);
        assert!(!verdict.detected);
        assert_eq!(verdict.confidence, LeakConfidence::Low);
    }

    #[test]
    fn test_window_is_capped_at_twenty() {
        // 40 flat snapshots followed by nothing: window must only see 20
        let series: Vec<_> = (0..40).map(|i| snapshot(i, 1024)).collect();
        let verdict = detect_leak(&series);
        assert_eq!(verdict.window_samples, DETECTION_WINDOW);
    }

    #[test]
    fn test_exactly_ten_snapshots_is_enough() {
        let series: Vec<_> = (0..10)
            .map(|i| snapshot(i, 50 * 1024 * 1024 + i * 4 * 1024 * 1024))
            .collect();
        let verdict = detect_leak(&series);
        assert!(verdict.detected);
    }

    #[test]
    fn test_verdict_is_deterministic_over_frozen_series() {
        let series: Vec<_> = (0..20)
            .map(|i| snapshot(i, 10 * 1024 * 1024 + i * 3 * 1024 * 1024))
            .collect();
        let a = detect_leak(&series);
        let b = detect_leak(&series);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_zero_time_delta_pairs_are_skipped() {
        let mut series: Vec<_> = (0..12).map(|i| snapshot(i, 1024 * (i + 1))).collect();
        // Duplicate timestamp in the middle
        series[6].timestamp_ms = series[5].timestamp_ms;
        let verdict = detect_leak(&series);
        assert!(verdict.avg_growth_rate_bytes_per_sec.is_finite());
    }
}
