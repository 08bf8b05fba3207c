//! Integration tests for the memory profiler
//!
//! Drive full runs against synthetic memory sources and verify the
//! persisted JSON report end to end: leak verdicts, threshold violations,
//! recommendations, and GC instrumentation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memwatch::config::{MemoryThresholds, ProfilerConfig};
use memwatch::profiler::report::{GcSummary, Priority};
use memwatch::profiler::source::{MemoryCounters, MemorySource};
use memwatch::profiler::thresholds::ThresholdKind;
use memwatch::profiler::MemoryProfiler;

/// Heap grows by `step` bytes on every sample
struct RampSource {
    heap: AtomicU64,
    step: u64,
}

impl RampSource {
    fn new(start: u64, step: u64) -> Self {
        Self {
            heap: AtomicU64::new(start),
            step,
        }
    }
}

impl MemorySource for RampSource {
    fn counters(&self) -> MemoryCounters {
        let heap = self.heap.fetch_add(self.step, Ordering::Relaxed);
        MemoryCounters {
            heap_used_bytes: heap,
            heap_peak_bytes: heap,
            external_bytes: 4 * 1024 * 1024,
            rss_bytes: heap + 64 * 1024 * 1024,
            large_buffer_bytes: 512 * 1024,
        }
    }
}

/// Heap stays put until something (the GC trigger) takes bytes away
struct SteadySource {
    heap: Arc<AtomicU64>,
}

impl MemorySource for SteadySource {
    fn counters(&self) -> MemoryCounters {
        let heap = self.heap.load(Ordering::Relaxed);
        MemoryCounters {
            heap_used_bytes: heap,
            heap_peak_bytes: heap,
            external_bytes: 1024 * 1024,
            rss_bytes: heap + 16 * 1024 * 1024,
            large_buffer_bytes: 0,
        }
    }
}

fn config_with(dir: &tempfile::TempDir, interval_ms: u64, duration_ms: u64) -> ProfilerConfig {
    ProfilerConfig {
        interval_ms,
        duration_ms,
        output_file: dir.path().join("memory-profile-report.json"),
        ..ProfilerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn report_file_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(&dir, 100, 1500);
    let path = config.output_file.clone();

    let profiler = MemoryProfiler::with_source(config, Arc::new(RampSource::new(8 * 1024 * 1024, 4096)));
    profiler.start().unwrap();
    profiler.finished().await;
    let report = profiler.stop().await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(
        parsed["summary"]["total_measurements"].as_u64().unwrap() as usize,
        report.summary.total_measurements
    );
    assert!(parsed["statistics"]["heap_used"]["max"].as_f64().unwrap() > 0.0);
    assert_eq!(parsed["gc"]["status"], "unavailable");
    assert_eq!(parsed["gc"]["message"], "GC monitoring not available");
    assert!(parsed["leak"]["detected"].is_boolean());
    assert_eq!(
        parsed["snapshots"].as_array().unwrap().len(),
        report.snapshots.len()
    );

    // Statistics ordering invariants hold for every metric series
    for metric in ["heap_used", "rss", "external"] {
        let stats = &parsed["statistics"][metric];
        let (min, mean, max) = (
            stats["min"].as_f64().unwrap(),
            stats["mean"].as_f64().unwrap(),
            stats["max"].as_f64().unwrap(),
        );
        let median = stats["median"].as_f64().unwrap();
        assert!(min <= mean && mean <= max);
        assert!(min <= median && median <= max);
    }
}

#[tokio::test(start_paused = true)]
async fn sustained_growth_yields_leak_verdict_and_critical_recommendation() {
    let dir = tempfile::tempdir().unwrap();
    // 2 MiB per second of sampled growth, 20+ samples
    let config = config_with(&dir, 1000, 25_000);
    let profiler =
        MemoryProfiler::with_source(config, Arc::new(RampSource::new(50 * 1024 * 1024, 2 * 1024 * 1024)));

    profiler.start().unwrap();
    profiler.finished().await;
    let report = profiler.stop().await.unwrap();

    assert!(report.leak.detected);
    let leak_rec = report
        .recommendations
        .iter()
        .find(|r| r.category == "Memory Leak")
        .expect("leak recommendation");
    assert_eq!(leak_rec.priority, Priority::Critical);
    assert!(report.text_summary().contains("Leak suspected: YES"));
}

#[tokio::test(start_paused = true)]
async fn flat_heap_produces_no_leak_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(&dir, 1000, 25_000);
    let profiler = MemoryProfiler::with_source(
        config,
        Arc::new(SteadySource {
            heap: Arc::new(AtomicU64::new(32 * 1024 * 1024)),
        }),
    );

    profiler.start().unwrap();
    profiler.finished().await;
    let report = profiler.stop().await.unwrap();

    assert!(!report.leak.detected);
    assert!(report.recommendations.iter().all(|r| r.category != "Memory Leak"));
}

#[tokio::test(start_paused = true)]
async fn tiny_heap_threshold_triggers_violation_and_recommendation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with(&dir, 100, 1000);
    config.thresholds = MemoryThresholds {
        heap_used_bytes: 1,
        ..MemoryThresholds::default()
    };

    let profiler = MemoryProfiler::with_source(config, Arc::new(RampSource::new(1024 * 1024, 256)));
    profiler.start().unwrap();
    profiler.finished().await;
    let report = profiler.stop().await.unwrap();

    assert!(report
        .violations
        .iter()
        .any(|v| v.kind == ThresholdKind::HeapUsage));
    let rec = report
        .recommendations
        .iter()
        .find(|r| r.category == "Memory Usage")
        .expect("memory usage recommendation");
    assert_eq!(rec.priority, Priority::High);
}

#[tokio::test(start_paused = true)]
async fn gc_hook_events_feed_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with(&dir, 100, 60_000);

    let heap = Arc::new(AtomicU64::new(40 * 1024 * 1024));
    let profiler = MemoryProfiler::with_source(
        config,
        Arc::new(SteadySource {
            heap: Arc::clone(&heap),
        }),
    );

    profiler.start().unwrap();

    let trigger_heap = Arc::clone(&heap);
    let mut collect = profiler.gc_hook().wrap(move || {
        trigger_heap.fetch_sub(5 * 1024 * 1024, Ordering::Relaxed);
    });
    collect();
    collect();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = profiler.stop().await.unwrap();

    assert_eq!(report.gc_events.len(), 2);
    match &report.gc {
        GcSummary::Available {
            count,
            total_heap_freed_bytes,
            ..
        } => {
            assert_eq!(*count, 2);
            assert_eq!(*total_heap_freed_bytes, 2 * 5 * 1024 * 1024);
        }
        GcSummary::Unavailable { .. } => panic!("gc hook was installed"),
    }
}

#[tokio::test(start_paused = true)]
async fn unwritable_report_path_still_returns_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with(&dir, 100, 300);
    // A directory that does not exist: the write fails, the report survives
    config.output_file = dir.path().join("missing").join("report.json");
    let path = config.output_file.clone();

    let profiler = MemoryProfiler::with_source(config, Arc::new(RampSource::new(1024, 64)));
    profiler.start().unwrap();
    profiler.finished().await;

    let report = profiler.stop().await.unwrap();
    assert!(report.summary.total_measurements > 0);
    assert!(!path.exists());
}
