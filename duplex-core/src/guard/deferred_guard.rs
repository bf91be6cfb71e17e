//! Deferred guard implementation for testing.
//!
//! This module provides `DeferredGuard`, a simple guard implementation that
//! defers all link tuple destruction until the guard is dropped.

use std::collections::HashSet;
use std::sync::Mutex;

use super::Guard;

/// A simple guard that defers all destruction until the guard is dropped.
///
/// The guard lives inside the list, so retired link tuples are released when
/// the last list or node handle goes away. Useful for tests where predictable
/// destruction timing matters; memory grows with every CAS until then.
///
/// # Thread Safety
///
/// `DeferredGuard` uses a `Mutex` internally to collect retired tuples from
/// multiple threads. The mutex guards reclamation bookkeeping only.
///
pub struct DeferredGuard {
    deferred: Mutex<Vec<DeferredAllocation>>,
    #[cfg(debug_assertions)]
    seen: Mutex<HashSet<usize>>,
}

struct DeferredAllocation {
    ptr: *mut (),
    dealloc: unsafe fn(*mut ()),
}

// Safety: DeferredAllocation is Send because we only store the pointer
// and deallocation function, and ensure proper synchronization via Mutex
unsafe impl Send for DeferredAllocation {}

impl DeferredGuard {
    /// Create a new deferred guard.
    pub fn new() -> Self {
        DeferredGuard {
            deferred: Mutex::new(Vec::new()),
            #[cfg(debug_assertions)]
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Number of allocations waiting for the guard to drop.
    pub fn pending(&self) -> usize {
        self.deferred
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl Default for DeferredGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let allocations = self
            .deferred
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // A tuple retired twice would be freed twice below.
        let mut seen: HashSet<usize> = HashSet::new();
        let duplicates = allocations
            .iter()
            .filter(|allocation| !seen.insert(allocation.ptr as usize))
            .count();
        if duplicates > 0 {
            log::error!(
                "{} duplicate pointer(s) among {} retired allocations",
                duplicates,
                allocations.len()
            );
            panic!("Found {} duplicate pointer(s) in deferred list", duplicates);
        }

        for allocation in allocations.drain(..) {
            unsafe {
                (allocation.dealloc)(allocation.ptr);
            }
        }
    }
}

impl Guard for DeferredGuard {
    /// For DeferredGuard, ReadGuard is a no-op since every retired tuple is
    /// kept until the list's stored guard drops.
    type ReadGuard = ();

    fn pin() -> Self::ReadGuard {
        // No-op for DeferredGuard - protection is provided by the stored guard
    }

    unsafe fn defer_destroy<N>(&self, ptr: *mut N, dealloc: unsafe fn(*mut N)) {
        #[cfg(debug_assertions)]
        {
            let addr = ptr as usize;
            let mut seen = self
                .seen
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !seen.insert(addr) {
                panic!("DUPLICATE defer_destroy at {:#x}", addr);
            }
        }

        let allocation = DeferredAllocation {
            ptr: ptr as *mut (),
            dealloc: unsafe {
                std::mem::transmute::<unsafe fn(*mut N), unsafe fn(*mut ())>(dealloc)
            },
        };
        self.deferred
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(allocation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_guard_basic() {
        let guard = DeferredGuard::default();

        let ptr = Box::into_raw(Box::new(42i32));

        unsafe {
            guard.defer_destroy(ptr, |p| {
                drop(Box::from_raw(p));
            });
        }

        assert_eq!(guard.pending(), 1);
        // Guard dropped here, allocation freed
    }

    #[test]
    fn test_pin_is_noop() {
        let _pinned: () = DeferredGuard::pin();
        let guard = DeferredGuard::new();
        assert_eq!(guard.pending(), 0);
    }

    #[test]
    fn test_multiple_deferred_allocations() {
        let guard = DeferredGuard::default();

        for i in 0..10 {
            let ptr = Box::into_raw(Box::new(i));
            unsafe {
                guard.defer_destroy(ptr, |p| {
                    drop(Box::from_raw(p));
                });
            }
        }

        assert_eq!(guard.pending(), 10);
        // All 10 allocations freed when guard drops
    }

    #[test]
    fn test_deferred_drop_runs_destructors() {
        use std::sync::Arc;

        let shared = Arc::new(7);
        let guard = DeferredGuard::default();

        let ptr = Box::into_raw(Box::new(Arc::clone(&shared)));
        unsafe {
            guard.defer_destroy(ptr, |p| {
                drop(Box::from_raw(p));
            });
        }
        assert_eq!(Arc::strong_count(&shared), 2);

        drop(guard);
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
