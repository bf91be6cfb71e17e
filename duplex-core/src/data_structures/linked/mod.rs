//! The lock-free doubly-linked list.
//!
//! - [`List`] - list handle: push/pop at the ends, iteration
//! - [`Node`] - node handle: traversal, insertion, removal, value exchange
//! - [`Iter`] - forward value iterator

mod iter;
mod list;
mod node;

pub use iter::Iter;
pub use list::List;
pub use node::Node;
