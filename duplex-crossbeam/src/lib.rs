//! Crossbeam-based reclamation for the duplex list.
//!
//! This crate provides `EpochGuard`, an implementation of the `Guard` trait
//! using crossbeam-epoch for memory reclamation.
//!
//! # Usage
//!
//! ```rust
//! use duplex_crossbeam::EpochList;
//!
//! let list: EpochList<i32> = EpochList::new();
//! list.push_right(42);
//! assert_eq!(list.pop_right().as_deref(), Some(&42));
//! ```

pub mod epoch_guard;

pub use epoch_guard::EpochGuard;

/// A list whose retired link tuples are reclaimed by the epoch collector.
///
/// Retired values may be dropped on any thread that collects, so value
/// types that are not `Send + Sync` are rejected:
///
/// ```compile_fail
/// use duplex_crossbeam::EpochList;
///
/// let list: EpochList<std::rc::Rc<i32>> = EpochList::new();
/// ```
pub type EpochList<T> = duplex_core::List<T, EpochGuard>;

/// Node handle of an [`EpochList`].
pub type EpochNode<T> = duplex_core::Node<T, EpochGuard>;
