//! memwatch library
//!
//! Exposes the memory profiler modules for use by the binary and tests.

pub mod config;
pub mod profiler;

pub use config::{MemoryThresholds, ProfilerConfig};
pub use profiler::{MemoryProfiler, MemorySnapshot, ProfilerState};
