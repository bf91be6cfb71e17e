//! Guard trait for memory reclamation strategies.
//!
//! Every CAS in the list replaces an immutable link tuple. The replaced tuple
//! may still be read by threads that loaded it before the CAS, so it is handed
//! to the list's guard instead of being freed on the spot.
//!
//! # Design
//!
//! The list is generic over its reclamation strategy:
//!
//! ```text
//! List<T, G: Guard>
//!     │
//!     ├── List<T, EpochGuard>      (production, duplex-crossbeam)
//!     └── List<T, DeferredGuard>   (testing)
//! ```
//!
//! Nodes themselves are reference counted. The guard only governs the link
//! tuples that carry those references, so a tuple dropped by the guard may in
//! turn release the last reference to a removed node.
//!
//! # Example
//!
//! ```rust,ignore
//! use duplex_core::{DeferredGuard, List};
//! use duplex_crossbeam::EpochGuard;
//!
//! // Production: epoch-based reclamation
//! let list: List<i32, EpochGuard> = List::new();
//! list.push_right(42);
//!
//! // Testing: deferred destruction
//! let test_list: List<i32, DeferredGuard> = List::new();
//! ```

mod deferred_guard;

pub use deferred_guard::DeferredGuard;

/// A memory reclamation guard that protects concurrent reads of link tuples.
///
/// # Safety Contract
///
/// Implementations must ensure that a pointer passed to `defer_destroy` is
/// not deallocated while any `ReadGuard` pinned before the call is alive.
///
/// # Design Note
///
/// Guards are stored in lists and must be `Send + Sync`. The stored guard
/// schedules destruction; thread pinning happens per operation through
/// [`Guard::pin`].
///
pub trait Guard: Sized + Default + Send + Sync {
    /// An active guard that protects reads for its lifetime.
    ///
    /// For epoch-based guards this is a pinned `crossbeam_epoch::Guard`.
    /// For deferred guards this is `()` since nothing is freed before the
    /// list itself is dropped.
    ///
    type ReadGuard: Sized;

    /// Pin an active read guard.
    ///
    /// Every list operation holds one of these from its first cell load to
    /// its last dereference.
    ///
    fn pin() -> Self::ReadGuard;

    /// Schedule a retired allocation for deferred destruction.
    ///
    /// # Safety
    ///
    /// - `ptr` must be a valid pointer previously allocated by the list
    /// - `ptr` must no longer be reachable from any link cell
    /// - `dealloc` must be the correct deallocation function for `ptr`
    ///
    unsafe fn defer_destroy<N>(&self, ptr: *mut N, dealloc: unsafe fn(*mut N));
}
