//! Process memory sampling.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                ProcessSampler                 │
//! │  ┌──────────────────┐   ┌──────────────────┐  │
//! │  │  /proc/<pid>/    │   │    HeapProbe     │  │
//! │  │  status (VmRSS,  │   │  (jemalloc       │  │
//! │  │  VmSize)         │   │  stats.allocated)│  │
//! │  └────────┬─────────┘   └──────────────────┘  │
//! │    ┌──────▼──────┐                            │
//! │    │  FileSystem │ (trait)                    │
//! │    └──────┬──────┘                            │
//! └───────────┼───────────────────────────────────┘
//!      ┌──────┴──────┐
//!   RealFs        MockFs
//! ```
//!
//! The sampler itself is stateless. Baseline tracking belongs to the session,
//! which hands the baseline to [`report::render_report`].

pub mod fs;
pub mod heap;
pub mod mock;
pub mod procfs;
pub mod report;

use std::path::PathBuf;

use tracing::warn;

pub use fs::{FileSystem, RealFs};
pub use heap::{FixedHeap, HeapProbe, JemallocHeap};
pub use mock::MockFs;
pub use report::render_report;

/// Point-in-time memory counters, all in bytes.
///
/// A counter that could not be read is recorded as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub resident_set_size: u64,
    pub virtual_size: u64,
    pub managed_heap_used: u64,
}

impl MemorySnapshot {
    /// Counters in report order, with their labels.
    pub fn metrics(&self) -> [(&'static str, u64); 3] {
        [
            ("rss", self.resident_set_size),
            ("vsize", self.virtual_size),
            ("heap_used", self.managed_heap_used),
        ]
    }
}

/// Anything that can produce memory snapshots for the session.
pub trait MemorySampler {
    /// Reads current counters. Never fails; unreadable counters are 0.
    fn sample(&self) -> MemorySnapshot;

    /// Best-effort request to return unused heap memory to the OS.
    fn collect_garbage(&self) {}
}

/// Samples a process through `/proc/<pid>/status` plus a heap probe.
pub struct ProcessSampler<F: FileSystem, H: HeapProbe> {
    fs: F,
    heap: H,
    status_path: PathBuf,
}

impl<F: FileSystem, H: HeapProbe> ProcessSampler<F, H> {
    /// Creates a sampler for the current process.
    pub fn new(fs: F, proc_path: impl Into<PathBuf>, heap: H) -> Self {
        Self::for_pid(fs, proc_path, "self", heap)
    }

    /// Creates a sampler for another process, e.g. a server the actions talk to.
    ///
    /// The heap probe still reports this process's allocator.
    pub fn for_pid(fs: F, proc_path: impl Into<PathBuf>, pid: &str, heap: H) -> Self {
        let status_path = proc_path.into().join(pid).join("status");
        if !fs.exists(&status_path) {
            warn!(
                "{} not found, resident and virtual sizes will read as 0",
                status_path.display()
            );
        }
        Self {
            fs,
            heap,
            status_path,
        }
    }

    fn read_status(&self) -> Option<(u64, u64)> {
        let content = match self.fs.read_to_string(&self.status_path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {}: {}", self.status_path.display(), e);
                return None;
            }
        };
        match procfs::parse_proc_status(&content) {
            Ok(status) => Some((
                status.vm_rss.saturating_mul(1024),
                status.vm_size.saturating_mul(1024),
            )),
            Err(e) => {
                warn!("{}: {}", self.status_path.display(), e);
                None
            }
        }
    }
}

impl<F: FileSystem, H: HeapProbe> MemorySampler for ProcessSampler<F, H> {
    fn sample(&self) -> MemorySnapshot {
        let (resident_set_size, virtual_size) = self.read_status().unwrap_or((0, 0));
        let managed_heap_used = self.heap.allocated().unwrap_or_else(|| {
            warn!("Heap allocation counter unavailable");
            0
        });
        MemorySnapshot {
            resident_set_size,
            virtual_size,
            managed_heap_used,
        }
    }

    fn collect_garbage(&self) {
        if !self.heap.release_unused() {
            warn!("Allocator did not accept the purge request");
        }
    }
}
