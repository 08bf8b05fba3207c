//! GC instrumentation hook
//!
//! Rust has no runtime garbage collector, so "GC" here means whatever
//! manual reclamation routine the host wires in: an allocator purge, a
//! cache drop, a pool trim. The profiler hands out a `GcHook`; the caller
//! wraps its own trigger closure and keeps calling the wrapped version.
//! Every invocation is timed and bracketed with before/after counters.
//! If no hook is ever installed, the report says so instead of guessing.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use super::source::{MemoryCounters, MemorySource};
use super::RunBuffers;

/// One instrumented reclamation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GcEvent {
    pub timestamp_ms: i64,
    pub duration_ms: f64,
    pub before: MemoryCounters,
    pub after: MemoryCounters,
    /// Signed: a reclamation pass can grow the heap
    pub heap_freed_bytes: i64,
    pub rss_freed_bytes: i64,
}

/// Handle for instrumenting a caller-supplied reclamation trigger
pub struct GcHook {
    source: Arc<dyn MemorySource>,
    buffers: Arc<Mutex<RunBuffers>>,
}

impl GcHook {
    pub(super) fn new(source: Arc<dyn MemorySource>, buffers: Arc<Mutex<RunBuffers>>) -> Self {
        Self { source, buffers }
    }

    /// Wrap a reclamation trigger. The returned closure behaves like the
    /// original but records a `GcEvent` per call while the profiler run is
    /// accepting samples.
    pub fn wrap<F>(&self, mut trigger: F) -> impl FnMut() + Send + 'static
    where
        F: FnMut() + Send + 'static,
    {
        self.buffers.lock().gc_hook_installed = true;

        let source = Arc::clone(&self.source);
        let buffers = Arc::clone(&self.buffers);

        move || {
            let before = source.counters();
            let started = Instant::now();
            trigger();
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
            let after = source.counters();

            let event = GcEvent {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                duration_ms,
                before,
                after,
                heap_freed_bytes: before.heap_used_bytes as i64 - after.heap_used_bytes as i64,
                rss_freed_bytes: before.rss_bytes as i64 - after.rss_bytes as i64,
            };

            let mut buffers = buffers.lock();
            if buffers.accepting {
                buffers.gc_events.push(event);
            }
        }
    }
}
