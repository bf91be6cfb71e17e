//! Data structures for concurrent collections.
//!
//! # Organization
//!
//! - [`linked`] - Lock-free doubly-linked list
//! - [`internal`] - Internal implementation details (pub(crate))

pub(crate) mod internal;
pub mod linked;

pub use linked::{Iter, List, Node};
