//! Internal implementation details.
//!
//! These are pub(crate) and not intended for external use.

pub mod atomic_link;
pub mod link;

pub(crate) use atomic_link::AtomicLink;
pub(crate) use link::{Link, ValueLink};
