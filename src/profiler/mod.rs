//! Memory profiling
//!
//! Sampling profiler for a single process:
//! - Periodic memory snapshots with derived growth fields
//! - Threshold monitoring with non-fatal warnings
//! - Optional instrumentation of manual reclamation ("GC") calls
//! - Sustained-growth leak heuristic
//! - JSON report with statistics and remediation recommendations
//!
//! One run per instance: `Idle -> Running -> Stopped`, no restart. The tick
//! loop lives in a single tokio task; snapshot and GC event buffers sit
//! behind one mutex, so appends are serialized and the report generator
//! only reads them after the run has stopped accepting samples.

pub mod allocator;
pub mod gc;
pub mod leak;
pub mod report;
pub mod source;
pub mod stats;
pub mod thresholds;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::ProfilerConfig;

use gc::{GcEvent, GcHook};
use report::MemoryReport;
use source::{MemorySource, ProcessMemorySource};
use thresholds::{ThresholdMonitor, ThresholdViolation};

/// One sampled observation with growth relative to its predecessor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    pub timestamp_ms: i64,
    pub elapsed_ms: u64,
    pub heap_used_bytes: u64,
    pub heap_peak_bytes: u64,
    pub external_bytes: u64,
    pub rss_bytes: u64,
    pub large_buffer_bytes: u64,
    /// Zero for the first snapshot (no predecessor)
    pub heap_growth_bytes: i64,
    pub rss_growth_bytes: i64,
    pub heap_growth_rate_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilerState {
    Idle,
    Running,
    Stopped,
}

/// Sample buffers for one run. Owned by the profiler until `stop()` hands
/// the assembled report to the caller.
#[derive(Debug, Default)]
pub(crate) struct RunBuffers {
    pub(crate) snapshots: Vec<MemorySnapshot>,
    pub(crate) gc_events: Vec<GcEvent>,
    pub(crate) violations: Vec<ThresholdViolation>,
    pub(crate) accepting: bool,
    pub(crate) gc_hook_installed: bool,
}

struct ProfilerShared {
    config: ProfilerConfig,
    source: Arc<dyn MemorySource>,
    monitor: ThresholdMonitor,
    buffers: Arc<Mutex<RunBuffers>>,
    state: Mutex<ProfilerState>,
    report: Mutex<Option<MemoryReport>>,
    done_tx: watch::Sender<bool>,
}

/// Sampling memory profiler. One run per instance.
pub struct MemoryProfiler {
    shared: Arc<ProfilerShared>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    done_rx: watch::Receiver<bool>,
}

impl MemoryProfiler {
    /// Profiler over the real process counters
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_source(config, Arc::new(ProcessMemorySource::new()))
    }

    /// Profiler over an injected counter source (synthetic in tests)
    pub fn with_source(config: ProfilerConfig, source: Arc<dyn MemorySource>) -> Self {
        let monitor = ThresholdMonitor::new(config.thresholds);
        let (done_tx, done_rx) = watch::channel(false);
        let (stop_tx, _) = watch::channel(false);

        Self {
            shared: Arc::new(ProfilerShared {
                config,
                source,
                monitor,
                buffers: Arc::new(Mutex::new(RunBuffers::default())),
                state: Mutex::new(ProfilerState::Idle),
                report: Mutex::new(None),
                done_tx,
            }),
            stop_tx,
            handle: Mutex::new(None),
            done_rx,
        }
    }

    pub fn state(&self) -> ProfilerState {
        *self.shared.state.lock()
    }

    /// Begin periodic capture. Must be called inside a tokio runtime.
    /// The first tick fires immediately, giving the t=0 baseline sample.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                ProfilerState::Idle => *state = ProfilerState::Running,
                ProfilerState::Running => bail!("memory profiler is already running"),
                ProfilerState::Stopped => {
                    bail!("memory profiler is stopped; construct a new instance to profile again")
                }
            }
        }
        self.shared.buffers.lock().accepting = true;

        let started = Instant::now();
        let started_at_ms = chrono::Utc::now().timestamp_millis();

        info!(
            interval_ms = self.shared.config.interval_ms,
            duration_ms = self.shared.config.duration_ms,
            "memory profiler started"
        );

        let shared = Arc::clone(&self.shared);
        let stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(run_loop(shared, stop_rx, started, started_at_ms));
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop sampling and return the report. Idempotent: the first call
    /// finalizes the run; later calls return the same report without
    /// re-running synthesis or rewriting the file. Completes any in-flight
    /// tick before finalizing.
    pub async fn stop(&self) -> Result<MemoryReport> {
        if self.state() == ProfilerState::Idle {
            bail!("memory profiler was never started");
        }

        let _ = self.stop_tx.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.await.context("memory profiler task failed")?;
        }

        self.shared
            .report
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("memory report missing after stop"))
    }

    /// Report from a finished run, if any
    pub fn report(&self) -> Option<MemoryReport> {
        self.shared.report.lock().clone()
    }

    /// Resolves once the run has finalized (explicit stop or elapsed
    /// duration). Lets a binary race profiling against an interrupt.
    pub async fn finished(&self) {
        let mut done_rx = self.done_rx.clone();
        if *done_rx.borrow_and_update() {
            return;
        }
        while done_rx.changed().await.is_ok() {
            if *done_rx.borrow() {
                return;
            }
        }
    }

    /// Handle for instrumenting a caller-supplied reclamation trigger.
    /// Without one, the report marks GC monitoring unavailable.
    pub fn gc_hook(&self) -> GcHook {
        GcHook::new(
            Arc::clone(&self.shared.source),
            Arc::clone(&self.shared.buffers),
        )
    }
}

async fn run_loop(
    shared: Arc<ProfilerShared>,
    mut stop_rx: watch::Receiver<bool>,
    started: Instant,
    started_at_ms: i64,
) {
    let interval_ms = shared.config.interval_ms.max(1);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = started + Duration::from_millis(shared.config.duration_ms);
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => {
                debug!("stop requested");
                break;
            }
            _ = ticker.tick() => {
                shared.capture_tick(started, started_at_ms);
            }
            _ = &mut sleep => {
                debug!("profiling duration elapsed");
                break;
            }
        }
    }

    shared.finalize(started, started_at_ms);
}

impl ProfilerShared {
    /// Capture one snapshot and run the threshold checks inline
    fn capture_tick(&self, started: Instant, started_at_ms: i64) {
        let counters = self.source.counters();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let interval_secs = self.config.interval_ms.max(1) as f64 / 1000.0;

        let mut buffers = self.buffers.lock();

        let (heap_growth_bytes, rss_growth_bytes, heap_growth_rate_bytes_per_sec) =
            match buffers.snapshots.last() {
                Some(prev) => {
                    let heap_growth =
                        counters.heap_used_bytes as i64 - prev.heap_used_bytes as i64;
                    let rss_growth = counters.rss_bytes as i64 - prev.rss_bytes as i64;
                    (heap_growth, rss_growth, heap_growth as f64 / interval_secs)
                }
                None => (0, 0, 0.0),
            };

        let snapshot = MemorySnapshot {
            timestamp_ms: started_at_ms + elapsed_ms as i64,
            elapsed_ms,
            heap_used_bytes: counters.heap_used_bytes,
            heap_peak_bytes: counters.heap_peak_bytes,
            external_bytes: counters.external_bytes,
            rss_bytes: counters.rss_bytes,
            large_buffer_bytes: counters.large_buffer_bytes,
            heap_growth_bytes,
            rss_growth_bytes,
            heap_growth_rate_bytes_per_sec,
        };

        let violations = self.monitor.check(&snapshot);
        buffers.violations.extend(violations);
        buffers.snapshots.push(snapshot);
    }

    /// Build, persist, and cache the report. Runs exactly once per run, on
    /// the tick task, whichever way the run ends.
    fn finalize(&self, started: Instant, started_at_ms: i64) {
        let run_elapsed_ms = started.elapsed().as_millis() as u64;

        let (snapshots, gc_events, violations, gc_hook_installed) = {
            let mut buffers = self.buffers.lock();
            buffers.accepting = false;
            (
                std::mem::take(&mut buffers.snapshots),
                std::mem::take(&mut buffers.gc_events),
                std::mem::take(&mut buffers.violations),
                buffers.gc_hook_installed,
            )
        };

        let measurements = snapshots.len();
        let report = report::build(
            &self.config,
            started_at_ms,
            run_elapsed_ms,
            snapshots,
            gc_events,
            violations,
            gc_hook_installed,
        );

        // Persistence failure degrades to in-memory only; the caller still
        // gets the report from stop().
        if let Err(err) = report.persist(&self.config.output_file) {
            error!(error = %err, "failed to persist memory report");
        } else {
            info!(
                path = %self.config.output_file.display(),
                measurements,
                "memory report written"
            );
        }

        *self.report.lock() = Some(report);
        *self.state.lock() = ProfilerState::Stopped;
        let _ = self.done_tx.send(true);
    }
}
