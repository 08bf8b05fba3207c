//! Custom Allocator for Memory Tracking
//!
//! Wraps the system allocator to maintain the heap counters the sampler
//! reads: live bytes, peak, cumulative totals, and live bytes held in
//! large (>= 1 MiB) allocations.
//!
//! Note: this has overhead and is only installed in the profiler binary.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocations at or above this size count toward the large-buffer total
pub const LARGE_BUFFER_THRESHOLD: usize = 1024 * 1024; // 1 MiB

/// Tracking allocator that wraps the System allocator
pub struct TrackingAllocator {
    inner: System,
}

impl TrackingAllocator {
    pub const fn new() -> Self {
        Self { inner: System }
    }
}

// Global counters for allocation tracking
pub static ALLOCATED_BYTES: AtomicUsize = AtomicUsize::new(0);
pub static DEALLOCATED_BYTES: AtomicUsize = AtomicUsize::new(0);
pub static ALLOCATION_COUNT: AtomicUsize = AtomicUsize::new(0);
pub static DEALLOCATION_COUNT: AtomicUsize = AtomicUsize::new(0);
pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
pub static LARGE_ALLOCATED_BYTES: AtomicUsize = AtomicUsize::new(0);
pub static LARGE_DEALLOCATED_BYTES: AtomicUsize = AtomicUsize::new(0);

fn update_peak(current: usize) {
    let mut peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
    while current > peak {
        match PEAK_ALLOCATED.compare_exchange_weak(
            peak,
            current,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(p) => peak = p,
        }
    }
}

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            let size = layout.size();
            ALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
            let prev = ALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
            update_peak(prev + size);

            if size >= LARGE_BUFFER_THRESHOLD {
                LARGE_ALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
            }
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let size = layout.size();
        DEALLOCATION_COUNT.fetch_add(1, Ordering::Relaxed);
        DEALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
        if size >= LARGE_BUFFER_THRESHOLD {
            LARGE_DEALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
        }
        self.inner.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let old_size = layout.size();
        let new_ptr = self.inner.realloc(ptr, layout, new_size);

        if !new_ptr.is_null() {
            // Track the size change
            if new_size > old_size {
                let diff = new_size - old_size;
                let prev = ALLOCATED_BYTES.fetch_add(diff, Ordering::Relaxed);
                update_peak(prev + diff);
            } else if new_size < old_size {
                let diff = old_size - new_size;
                DEALLOCATED_BYTES.fetch_add(diff, Ordering::Relaxed);
            }

            // Large-buffer accounting treats a realloc as free(old) + alloc(new)
            if old_size >= LARGE_BUFFER_THRESHOLD {
                LARGE_DEALLOCATED_BYTES.fetch_add(old_size, Ordering::Relaxed);
            }
            if new_size >= LARGE_BUFFER_THRESHOLD {
                LARGE_ALLOCATED_BYTES.fetch_add(new_size, Ordering::Relaxed);
            }
        }
        new_ptr
    }
}

/// Get current allocation statistics
pub fn allocation_stats() -> AllocationStats {
    let allocated = ALLOCATED_BYTES.load(Ordering::Relaxed);
    let deallocated = DEALLOCATED_BYTES.load(Ordering::Relaxed);
    let large_allocated = LARGE_ALLOCATED_BYTES.load(Ordering::Relaxed);
    let large_deallocated = LARGE_DEALLOCATED_BYTES.load(Ordering::Relaxed);

    AllocationStats {
        current_bytes: allocated.saturating_sub(deallocated),
        peak_bytes: PEAK_ALLOCATED.load(Ordering::Relaxed),
        total_allocated_bytes: allocated,
        total_deallocated_bytes: deallocated,
        allocation_count: ALLOCATION_COUNT.load(Ordering::Relaxed),
        deallocation_count: DEALLOCATION_COUNT.load(Ordering::Relaxed),
        large_buffer_bytes: large_allocated.saturating_sub(large_deallocated),
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AllocationStats {
    pub current_bytes: usize,
    pub peak_bytes: usize,
    pub total_allocated_bytes: usize,
    pub total_deallocated_bytes: usize,
    pub allocation_count: usize,
    pub deallocation_count: usize,
    pub large_buffer_bytes: usize,
}

/// Reset allocation counters (useful for benchmarking)
pub fn reset_counters() {
    ALLOCATED_BYTES.store(0, Ordering::Relaxed);
    DEALLOCATED_BYTES.store(0, Ordering::Relaxed);
    ALLOCATION_COUNT.store(0, Ordering::Relaxed);
    DEALLOCATION_COUNT.store(0, Ordering::Relaxed);
    PEAK_ALLOCATED.store(0, Ordering::Relaxed);
    LARGE_ALLOCATED_BYTES.store(0, Ordering::Relaxed);
    LARGE_DEALLOCATED_BYTES.store(0, Ordering::Relaxed);
}

// To install the tracking allocator in a binary:
//
// #[global_allocator]
// static ALLOCATOR: memwatch::profiler::allocator::TrackingAllocator =
//     memwatch::profiler::allocator::TrackingAllocator::new();
