// Link tuples stored behind the atomic cells of a list node.
//
//   Link       = (target, marked)
//   ValueLink  = (value, Link)
//
// Both are immutable once published. A CAS swaps the whole tuple, so a reader
// that loaded a tuple always sees a target and a mark that belonged together.
//
// A marked Link means the node OWNING the cell is logically deleted and
// `target` was its neighbour at the moment of deletion.
//
use std::sync::{Arc, Weak};

/// Anything a link can point at, compared by address only.
pub(crate) trait LinkTarget {
    fn addr(&self) -> *const ();
}

impl<N> LinkTarget for Arc<N> {
    #[inline]
    fn addr(&self) -> *const () {
        Arc::as_ptr(self) as *const ()
    }
}

impl<N> LinkTarget for Option<Arc<N>> {
    #[inline]
    fn addr(&self) -> *const () {
        match self {
            Some(node) => Arc::as_ptr(node) as *const (),
            None => std::ptr::null(),
        }
    }
}

// A dangling `Weak::new()` reports a sentinel address that no live
// allocation can share. A Weak keeps its allocation reserved, so a stale
// target is never confused with a newer node at the same address.
impl<N> LinkTarget for Weak<N> {
    #[inline]
    fn addr(&self) -> *const () {
        Weak::as_ptr(self) as *const ()
    }
}

#[derive(Clone)]
pub(crate) struct Link<P> {
    target: P,
    marked: bool,
}

impl<P: LinkTarget> Link<P> {
    #[inline]
    pub(crate) fn new(target: P, marked: bool) -> Self {
        Link { target, marked }
    }

    #[inline]
    pub(crate) fn target(&self) -> &P {
        &self.target
    }

    #[inline]
    pub(crate) fn is_marked(&self) -> bool {
        self.marked
    }

    /// Same target, mark set.
    #[inline]
    pub(crate) fn to_marked(&self) -> Self
    where
        P: Clone,
    {
        Link {
            target: self.target.clone(),
            marked: true,
        }
    }

    /// Identity comparison against `(target, marked)`.
    #[inline]
    pub(crate) fn is<Q: LinkTarget + ?Sized>(&self, target: &Q, marked: bool) -> bool {
        self.marked == marked && self.target.addr() == target.addr()
    }
}

impl<P: LinkTarget> PartialEq for Link<P> {
    fn eq(&self, other: &Self) -> bool {
        self.is(&other.target, other.marked)
    }
}

/// A node value together with the forward link that shares its cell.
///
/// `value` is `None` only for the Head and Tail sentinels.
pub(crate) struct ValueLink<V, P> {
    value: Option<Arc<V>>,
    link: Link<P>,
}

impl<V, P: LinkTarget + Clone> ValueLink<V, P> {
    #[inline]
    pub(crate) fn new(value: Option<Arc<V>>, link: Link<P>) -> Self {
        ValueLink { value, link }
    }

    #[inline]
    pub(crate) fn value(&self) -> Option<&Arc<V>> {
        self.value.as_ref()
    }

    #[inline]
    pub(crate) fn link(&self) -> &Link<P> {
        &self.link
    }

    /// Current value carried forward, link replaced.
    #[inline]
    pub(crate) fn with_link(&self, link: Link<P>) -> Self {
        ValueLink {
            value: self.value.clone(),
            link,
        }
    }

    /// Current link carried forward, value replaced.
    #[inline]
    pub(crate) fn with_value(&self, value: Arc<V>) -> Self {
        ValueLink {
            value: Some(value),
            link: self.link.clone(),
        }
    }

    /// Value identity: both sides hold the same allocation, or both are empty.
    #[inline]
    pub(crate) fn holds(&self, value: &Arc<V>) -> bool {
        self.value
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, value))
    }

    /// Moves the link out, used when tearing a node down.
    pub(crate) fn into_link(self) -> Link<P> {
        self.link
    }
}

impl<P> Link<P> {
    pub(crate) fn into_target(self) -> P {
        self.target
    }
}
