//! Lock-free doubly-linked list.
//!
//! Insertion, deletion, value exchange and traversal in both directions from
//! any number of threads, without locks. Every structural change is a single
//! compare-and-swap on an immutable link tuple; removed nodes are marked
//! first and unlinked afterwards by whichever thread gets there.
//!
//! The list is generic over its memory reclamation [`Guard`]. This crate
//! ships [`DeferredGuard`] for tests; `duplex-crossbeam` provides the
//! epoch-based guard for production use.

#[cfg(feature = "common-tests")]
pub mod common_tests;
pub mod data_structures;
pub mod error;
pub mod guard;

pub use data_structures::{Iter, List, Node};
pub use error::{ListError, Result, Sentinel};
pub use guard::{DeferredGuard, Guard};
