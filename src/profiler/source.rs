//! Memory counter sources
//!
//! The sampler reads counters through the `MemorySource` trait so it can be
//! driven by synthetic series in tests. The process-backed implementation
//! combines the tracking allocator (heap) with sysinfo (RSS).

use serde::Serialize;

use super::allocator;

/// One raw reading of the process memory counters.
///
/// Mapping for the process-backed source: heap = live bytes in the tracking
/// allocator, heap peak = allocator high-water mark, external = RSS not
/// attributable to the tracked heap, large buffers = live allocations of
/// 1 MiB or more.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MemoryCounters {
    pub heap_used_bytes: u64,
    pub heap_peak_bytes: u64,
    pub external_bytes: u64,
    pub rss_bytes: u64,
    pub large_buffer_bytes: u64,
}

/// Where the sampler gets its counters from
pub trait MemorySource: Send + Sync {
    fn counters(&self) -> MemoryCounters;
}

/// Real process memory: tracking allocator + sysinfo RSS
#[derive(Debug, Default)]
pub struct ProcessMemorySource;

impl ProcessMemorySource {
    pub fn new() -> Self {
        Self
    }

    /// Resident set size of this process, via a cached System instance
    /// (creating one per sample is expensive)
    fn process_rss() -> u64 {
        use parking_lot::Mutex;
        use std::sync::OnceLock;
        use sysinfo::{Pid, ProcessRefreshKind, System};

        static CACHED_SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();

        let sys_mutex = CACHED_SYSTEM.get_or_init(|| Mutex::new(System::new()));
        let mut sys = sys_mutex.lock();

        let pid = Pid::from_u32(std::process::id());
        // Only refresh our specific process, and only its memory
        sys.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            ProcessRefreshKind::new().with_memory(),
        );

        sys.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl MemorySource for ProcessMemorySource {
    fn counters(&self) -> MemoryCounters {
        let stats = allocator::allocation_stats();
        let rss = Self::process_rss();
        let heap_used = stats.current_bytes as u64;

        MemoryCounters {
            heap_used_bytes: heap_used,
            heap_peak_bytes: stats.peak_bytes as u64,
            external_bytes: rss.saturating_sub(heap_used),
            rss_bytes: rss,
            large_buffer_bytes: stats.large_buffer_bytes as u64,
        }
    }
}
