//! Allocator-level heap counters and the `gc` hook.
//!
//! The binary installs jemalloc as the global allocator, so jemalloc's
//! `stats.allocated` is the number of bytes currently handed out to Rust code.

/// `MALLCTL_ARENAS_ALL` from jemalloc: addresses every arena at once.
const MALLCTL_ARENAS_ALL: u32 = 4096;

/// Source of the managed-heap counter and the collection request.
pub trait HeapProbe {
    /// Bytes currently allocated by the application, if the allocator exposes it.
    fn allocated(&self) -> Option<u64>;

    /// Asks the allocator to give unused memory back to the OS.
    /// Returns `false` when the request was not honoured.
    fn release_unused(&self) -> bool;
}

/// Reads counters from jemalloc through `mallctl`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JemallocHeap;

impl JemallocHeap {
    pub fn new() -> Self {
        Self
    }
}

impl HeapProbe for JemallocHeap {
    fn allocated(&self) -> Option<u64> {
        // Statistics are cached by jemalloc and only refreshed when the
        // epoch is advanced.
        let mut current_epoch: u64 = 0;
        let mut next_epoch: u64 = 1;
        let mut epoch_len = std::mem::size_of::<u64>();
        // SAFETY: "epoch" takes and returns a u64; both pointers reference
        // live locals of that size and the lengths match.
        let rc = unsafe {
            tikv_jemalloc_sys::mallctl(
                c"epoch".as_ptr().cast(),
                (&mut current_epoch as *mut u64).cast(),
                &mut epoch_len,
                (&mut next_epoch as *mut u64).cast(),
                std::mem::size_of::<u64>(),
            )
        };
        if rc != 0 {
            return None;
        }

        let mut allocated: usize = 0;
        let mut len = std::mem::size_of::<usize>();
        // SAFETY: "stats.allocated" is a read-only size_t; oldp points at a
        // usize local and oldlenp holds its size.
        let rc = unsafe {
            tikv_jemalloc_sys::mallctl(
                c"stats.allocated".as_ptr().cast(),
                (&mut allocated as *mut usize).cast(),
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if rc != 0 {
            return None;
        }
        Some(allocated as u64)
    }

    fn release_unused(&self) -> bool {
        let name = format!("arena.{}.purge\0", MALLCTL_ARENAS_ALL);
        // SAFETY: the purge control takes no arguments; the name is
        // NUL-terminated and outlives the call.
        let rc = unsafe {
            tikv_jemalloc_sys::mallctl(
                name.as_ptr().cast(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                0,
            )
        };
        rc == 0
    }
}

/// Heap probe returning fixed values, for tests and hosts without jemalloc.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedHeap {
    pub allocated: Option<u64>,
}

impl HeapProbe for FixedHeap {
    fn allocated(&self) -> Option<u64> {
        self.allocated
    }

    fn release_unused(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jemalloc_counters_available() {
        let heap = JemallocHeap::new();
        // jemalloc is linked even when it is not the global allocator, so
        // the controls answer; the value itself is not meaningful here.
        assert!(heap.allocated().is_some());
        assert!(heap.release_unused());
    }

    #[test]
    fn test_fixed_heap() {
        let heap = FixedHeap {
            allocated: Some(42),
        };
        assert_eq!(heap.allocated(), Some(42));
        assert!(!heap.release_unused());
        assert_eq!(FixedHeap::default().allocated(), None);
    }
}
