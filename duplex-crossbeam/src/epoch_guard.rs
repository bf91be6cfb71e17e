//! Epoch-based guard implementation using crossbeam-epoch.
//!
//! `EpochGuard` is a zero-sized type that hands retired link tuples to the
//! global epoch collector. A list parameterized with it frees replaced
//! tuples once every thread that could still read them has unpinned:
//!
//! ```text
//! List<i32, EpochGuard>
//!     │
//!     ├── every operation runs under epoch::pin()
//!     └── replaced link tuples go to Guard::defer_unchecked
//! ```
//!
//! # Example
//!
//! ```rust
//! use duplex_core::List;
//! use duplex_crossbeam::EpochGuard;
//!
//! let list: List<i32, EpochGuard> = List::new();
//! let node = list.push_right(42);
//! node.insert_before(17);
//!
//! assert_eq!(list.to_vec(), vec![17, 42]);
//! assert!(node.remove());
//! ```

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};
use duplex_core::guard::Guard;

/// Epoch-based memory reclamation guard.
///
/// Unlike `DeferredGuard`, which keeps every retired tuple until the list
/// drops, `EpochGuard` stores nothing. Retired tuples are reclaimed in
/// batches while the list is in use, so long-running lists stay bounded.
///
/// The read guard is a real crossbeam pin. A tuple loaded under it stays
/// valid until the pin is dropped, even if another thread replaces it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochGuard {
    // Zero-sized - all state is in the global epoch collector
}

impl EpochGuard {
    pub fn new() -> Self {
        EpochGuard {}
    }
}

impl Guard for EpochGuard {
    type ReadGuard = CrossbeamGuard;

    fn pin() -> Self::ReadGuard {
        epoch::pin()
    }

    unsafe fn defer_destroy<N>(&self, ptr: *mut N, dealloc: unsafe fn(*mut N)) {
        // Reentrant when the caller is already pinned.
        let guard = epoch::pin();
        unsafe {
            guard.defer_unchecked(move || {
                dealloc(ptr);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    unsafe fn drop_tracked(ptr: *mut Tracked) {
        drop(unsafe { Box::from_raw(ptr) });
    }

    #[test]
    fn test_epoch_guard_is_zero_sized() {
        assert_eq!(std::mem::size_of::<EpochGuard>(), 0);
    }

    #[test]
    #[serial]
    fn test_deferred_destruction_runs_eventually() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let guard = EpochGuard::new();

        for _ in 0..4 {
            let ptr = Box::into_raw(Box::new(Tracked(Arc::clone(&dropped))));
            unsafe { guard.defer_destroy(ptr, drop_tracked) };
        }

        // Deferred functions run once the epoch has advanced and the local
        // bag is flushed.
        for _ in 0..1_000 {
            if dropped.load(Ordering::SeqCst) == 4 {
                break;
            }
            let pin = EpochGuard::pin();
            pin.flush();
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 4);
    }

    #[test]
    #[serial]
    fn test_pinned_reader_delays_destruction() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let guard = EpochGuard::default();

        let reader = EpochGuard::pin();
        let ptr = Box::into_raw(Box::new(Tracked(Arc::clone(&dropped))));
        unsafe { guard.defer_destroy(ptr, drop_tracked) };

        for _ in 0..100 {
            epoch::pin().flush();
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        drop(reader);
    }
}
