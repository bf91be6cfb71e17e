use std::fmt;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::data_structures::internal::{AtomicLink, Link, ValueLink};
use crate::error::{ListError, Result, Sentinel};
use crate::guard::Guard;

use super::list::{List, ListCore};

pub(crate) type NodeRef<T> = Arc<NodeInner<T>>;
pub(crate) type NextTarget<T> = Option<NodeRef<T>>;
pub(crate) type PrevLink<T> = Link<Weak<NodeInner<T>>>;
pub(crate) type NextLink<T> = ValueLink<T, NextTarget<T>>;

#[cfg(debug_assertions)]
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Head,
    Tail,
    Data,
}

// Node layout:
//
//            prev (Weak)                    next (Arc) + value
//   ┌──────┐ ◄──────────── ┌──────┐ ──────────────► ┌──────┐
//   │ HEAD │               │ node │                 │ TAIL │
//   └──────┘ ────────────► └──────┘ ◄────────────── └──────┘
//
// `next` is the authoritative chain and holds strong references. `prev` is a
// hint repaired by correct_prev and holds weak references, so two removed
// neighbours pointing at each other never keep one another alive.
//
// Only tail has `next.target == None`; only head has a dangling `prev`.
pub(crate) struct NodeInner<T> {
    kind: NodeKind,
    pub(crate) prev: AtomicLink<PrevLink<T>>,
    pub(crate) next: AtomicLink<NextLink<T>>,
    #[cfg(debug_assertions)]
    id: u64,
}

impl<T> NodeInner<T> {
    pub(crate) fn new(
        kind: NodeKind,
        value: Option<Arc<T>>,
        prev: Weak<NodeInner<T>>,
        next: NextTarget<T>,
    ) -> Self {
        NodeInner {
            kind,
            prev: AtomicLink::new(Link::new(prev, false)),
            next: AtomicLink::new(ValueLink::new(value, Link::new(next, false))),
            #[cfg(debug_assertions)]
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// A private data node, not linked anywhere yet.
    pub(crate) fn data(value: T) -> NodeRef<T> {
        Arc::new(Self::new(NodeKind::Data, Some(Arc::new(value)), Weak::new(), None))
    }

    #[inline]
    pub(crate) fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub(crate) fn is_head(&self) -> bool {
        self.kind == NodeKind::Head
    }

    #[inline]
    pub(crate) fn is_tail(&self) -> bool {
        self.kind == NodeKind::Tail
    }

    #[inline]
    pub(crate) fn is_sentinel(&self) -> bool {
        self.kind != NodeKind::Data
    }

    pub(crate) fn sentinel(&self) -> Option<Sentinel> {
        match self.kind {
            NodeKind::Head => Some(Sentinel::Head),
            NodeKind::Tail => Some(Sentinel::Tail),
            NodeKind::Data => None,
        }
    }

    /// Logical deletion flag: the mark on `next`.
    #[inline]
    pub(crate) fn is_removed<P>(&self, pin: &P) -> bool {
        self.next.load(pin).link().is_marked()
    }

    /// Point a private node at its intended neighbours, keeping its value.
    ///
    /// # Safety
    ///
    /// The node must not have been published into the list yet.
    pub(crate) unsafe fn attach(&self, prev: &NodeRef<T>, next: &NodeRef<T>) {
        let value = self.next.load(&()).value().cloned();
        unsafe {
            self.prev.reset(Link::new(Arc::downgrade(prev), false));
            self.next
                .reset(ValueLink::new(value, Link::new(Some(Arc::clone(next)), false)));
        }
    }

    #[cfg(debug_assertions)]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

// Dropping a node releases its successor, which may release the next one and
// so on. Unwind that chain in a loop instead of through nested drops.
impl<T> Drop for NodeInner<T> {
    fn drop(&mut self) {
        let mut successor = take_successor(&mut self.next);
        while let Some(node) = successor {
            successor = match Arc::try_unwrap(node) {
                Ok(mut inner) => take_successor(&mut inner.next),
                Err(_) => None,
            };
        }
    }
}

fn take_successor<T>(cell: &mut AtomicLink<NextLink<T>>) -> NextTarget<T> {
    cell.take()
        .and_then(|tuple| tuple.into_link().into_target())
}

/// A handle to one node of a [`List`], sentinel or data.
///
/// The handle keeps both the node and its list alive. A removed node stays
/// readable through the handle, but traversals started from it skip ahead to
/// live nodes.
pub struct Node<T, G: Guard> {
    list: Arc<ListCore<T, G>>,
    inner: NodeRef<T>,
}

impl<T, G: Guard> Node<T, G> {
    pub(crate) fn from_parts(list: Arc<ListCore<T, G>>, inner: NodeRef<T>) -> Self {
        Node { list, inner }
    }

    fn wrap(&self, inner: NodeRef<T>) -> Self {
        Node::from_parts(Arc::clone(&self.list), inner)
    }

    fn sentinel_check(&self) -> Result<()> {
        match self.inner.sentinel() {
            Some(sentinel) => Err(ListError::Sentinel(sentinel)),
            None => Ok(()),
        }
    }

    fn value_of(&self, tuple: &NextLink<T>) -> Result<Arc<T>> {
        match tuple.value() {
            Some(value) => Ok(Arc::clone(value)),
            None => Err(ListError::Sentinel(
                self.inner.sentinel().unwrap_or(Sentinel::Head),
            )),
        }
    }

    /// The list this node belongs to.
    pub fn list(&self) -> List<T, G> {
        List::from_core(Arc::clone(&self.list))
    }

    pub fn is_head(&self) -> bool {
        self.inner.is_head()
    }

    pub fn is_tail(&self) -> bool {
        self.inner.is_tail()
    }

    pub fn is_sentinel(&self) -> bool {
        self.inner.is_sentinel()
    }

    /// Whether the node has been logically deleted. Sentinels never are.
    pub fn is_removed(&self) -> bool {
        let pin = G::pin();
        self.inner.is_removed(&pin)
    }

    /// Node identity.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Creation order of the node, available in debug builds.
    #[cfg(debug_assertions)]
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Current value. Works on removed nodes, fails on sentinels.
    pub fn value(&self) -> Result<Arc<T>> {
        self.sentinel_check()?;
        let pin = G::pin();
        self.value_of(self.inner.next.load(&pin))
    }

    /// Replace the value. May land on a node that is being removed; it never
    /// brings a removed node back.
    pub fn set_value(&self, value: T) -> Result<()> {
        self.sentinel_check()?;
        let pin = G::pin();
        let value = Arc::new(value);
        let _ = self.inner.next.fetch_update(&self.list.guard, &pin, |current| {
            Some(current.with_value(Arc::clone(&value)))
        });
        Ok(())
    }

    /// Store `new` if the current value is the very allocation `comparand`.
    ///
    /// Returns the value observed at the decisive moment: `comparand` itself
    /// on success, the value that prevented the exchange otherwise.
    pub fn compare_exchange_value(&self, new: T, comparand: &Arc<T>) -> Result<Arc<T>> {
        self.sentinel_check()?;
        let pin = G::pin();
        let new = Arc::new(new);
        let observed = match self.inner.next.fetch_update(&self.list.guard, &pin, |current| {
            current
                .holds(comparand)
                .then(|| current.with_value(Arc::clone(&new)))
        }) {
            Ok(previous) => previous,
            Err(observed) => observed,
        };
        self.value_of(observed)
    }

    /// Derive a replacement from the prevalent value until one sticks.
    ///
    /// `f` returning `None` gives up with `(prevalent, false)`. After a
    /// successful exchange the replaced value is returned with `true`.
    pub fn compare_exchange_value_if<F>(&self, mut f: F) -> Result<(Arc<T>, bool)>
    where
        F: FnMut(&T) -> Option<T>,
    {
        let mut old = self.value()?;
        loop {
            let Some(new) = f(&old) else {
                return Ok((old, false));
            };
            let prevalent = self.compare_exchange_value(new, &old)?;
            if Arc::ptr_eq(&prevalent, &old) {
                return Ok((old, true));
            }
            old = prevalent;
        }
    }

    /// The next live data node, `None` at the end of the list.
    pub fn next(&self) -> Option<Self> {
        let pin = G::pin();
        let mut cursor = Arc::clone(&self.inner);
        if self.list.to_next(&mut cursor, &pin) && !cursor.is_tail() {
            Some(self.wrap(cursor))
        } else {
            None
        }
    }

    /// The previous live data node, `None` at the start of the list.
    pub fn prev(&self) -> Option<Self> {
        let pin = G::pin();
        let mut cursor = Arc::clone(&self.inner);
        if self.list.to_prev(&mut cursor, &pin) && !cursor.is_head() {
            Some(self.wrap(cursor))
        } else {
            None
        }
    }

    /// Insert `value` immediately before this node.
    ///
    /// On head this inserts after head. If this node gets removed meanwhile,
    /// the value goes before its nearest live successor.
    pub fn insert_before(&self, value: T) -> Self {
        let pin = G::pin();
        let node = self
            .list
            .link_before(&self.inner, NodeInner::data(value), &pin);
        self.wrap(node)
    }

    /// Insert `value` immediately after this node.
    ///
    /// On tail this inserts before tail. If this node gets removed meanwhile,
    /// the value goes before its nearest live successor.
    pub fn insert_after(&self, value: T) -> Self {
        let pin = G::pin();
        let node = self
            .list
            .link_after(&self.inner, NodeInner::data(value), &pin);
        self.wrap(node)
    }

    /// Insert `value` after this node only while this node is live and its
    /// value satisfies `predicate`.
    ///
    /// The predicate is re-evaluated against the value observed right before
    /// every CAS attempt. Sentinels never qualify.
    pub fn insert_after_if<F>(&self, value: T, predicate: F) -> Option<Self>
    where
        F: Fn(&T) -> bool,
    {
        if self.inner.is_sentinel() {
            return None;
        }
        let pin = G::pin();
        self.list
            .link_after_if(&self.inner, NodeInner::data(value), predicate, &pin)
            .map(|node| self.wrap(node))
    }

    /// Logically delete the node and unlink it.
    ///
    /// Exactly one caller wins and gets `true`. Sentinels and nodes that are
    /// already removed return `false`.
    pub fn remove(&self) -> bool {
        if self.inner.is_sentinel() {
            return false;
        }
        let pin = G::pin();
        self.list.unlink(&self.inner, &pin)
    }
}

impl<T, G: Guard> Clone for Node<T, G> {
    fn clone(&self) -> Self {
        self.wrap(Arc::clone(&self.inner))
    }
}

impl<T, G: Guard> PartialEq for Node<T, G> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T, G: Guard> Eq for Node<T, G> {}

impl<T: fmt::Debug, G: Guard> fmt::Debug for Node<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pin = G::pin();
        let tuple = self.inner.next.load(&pin);
        let mut out = f.debug_struct("Node");
        #[cfg(debug_assertions)]
        out.field("id", &self.inner.id());
        out.field("kind", &self.inner.kind())
            .field("removed", &tuple.link().is_marked())
            .field("value", &tuple.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::DeferredGuard;

    type TestList = List<i32, DeferredGuard>;

    #[test]
    fn test_sentinels_reject_value_access() {
        let list = TestList::new();
        let head = list.head();
        let tail = list.tail();

        assert_eq!(head.value(), Err(ListError::Sentinel(Sentinel::Head)));
        assert_eq!(tail.set_value(1), Err(ListError::Sentinel(Sentinel::Tail)));
        assert_eq!(
            head.compare_exchange_value(1, &Arc::new(0)),
            Err(ListError::Sentinel(Sentinel::Head))
        );
        assert!(tail.compare_exchange_value_if(|_| Some(1)).is_err());
        assert!(!head.remove());
        assert!(!tail.remove());
        assert!(!head.is_removed());
    }

    #[test]
    fn test_value_roundtrip_and_identity_exchange() {
        let list = TestList::new();
        let node = list.push_right(1);

        let one = node.value().unwrap();
        assert_eq!(*one, 1);

        // Equal but distinct allocation does not match.
        let prevalent = node.compare_exchange_value(2, &Arc::new(1)).unwrap();
        assert!(Arc::ptr_eq(&prevalent, &one));
        assert_eq!(*node.value().unwrap(), 1);

        let prevalent = node.compare_exchange_value(2, &one).unwrap();
        assert!(Arc::ptr_eq(&prevalent, &one));
        assert_eq!(*node.value().unwrap(), 2);

        node.set_value(5).unwrap();
        assert_eq!(*node.value().unwrap(), 5);
    }

    #[test]
    fn test_compare_exchange_value_if() {
        let list = TestList::new();
        let node = list.push_right(10);

        let (replaced, done) = node
            .compare_exchange_value_if(|v| (*v < 100).then_some(v + 1))
            .unwrap();
        assert!(done);
        assert_eq!(*replaced, 10);
        assert_eq!(*node.value().unwrap(), 11);

        let (prevalent, done) = node.compare_exchange_value_if(|_| None).unwrap();
        assert!(!done);
        assert_eq!(*prevalent, 11);
    }

    #[test]
    fn test_removed_node_keeps_value() {
        let list = TestList::new();
        let node = list.push_right(3);
        assert!(node.remove());
        assert!(node.is_removed());
        assert!(!node.remove());
        assert_eq!(*node.value().unwrap(), 3);
        node.set_value(4).unwrap();
        assert!(node.is_removed());
        assert!(list.is_empty());
    }

    #[test]
    fn test_next_prev_stop_at_sentinels() {
        let list = TestList::new();
        assert!(list.head().next().is_none());
        assert!(list.tail().prev().is_none());

        let a = list.push_right(1);
        let b = list.push_right(2);
        assert_eq!(list.head().next(), Some(a.clone()));
        assert_eq!(a.next(), Some(b.clone()));
        assert!(b.next().is_none());
        assert_eq!(b.prev(), Some(a.clone()));
        assert!(a.prev().is_none());
        assert_eq!(list.tail().prev(), Some(b));
        assert!(list.tail().next().is_none());
        assert!(list.head().prev().is_none());
    }

    #[test]
    fn test_traversal_skips_removed_node() {
        let list: TestList = [1, 2, 3].into_iter().collect();
        let one = list.head().next().unwrap();
        let two = one.next().unwrap();
        let three = two.next().unwrap();

        assert!(two.remove());
        assert_eq!(one.next(), Some(three.clone()));
        assert_eq!(three.prev(), Some(one.clone()));
        // From a removed node, next walks to the live successor.
        assert_eq!(two.next(), Some(three.clone()));
        // And prev re-anchors on that successor first.
        assert_eq!(two.prev(), Some(one));
    }

    #[test]
    fn test_insert_relative_to_sentinels() {
        let list = TestList::new();
        list.tail().insert_after(2);
        list.head().insert_before(1);
        list.tail().insert_before(3);
        list.head().insert_after(0);
        assert_eq!(list.to_vec(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_insert_at_removed_anchor_goes_before_successor() {
        let list: TestList = [1, 2, 3].into_iter().collect();
        let two = list.head().next().unwrap().next().unwrap();
        assert!(two.remove());

        two.insert_before(20);
        two.insert_after(21);
        assert_eq!(list.to_vec(), vec![1, 20, 21, 3]);
    }

    #[test]
    fn test_insert_after_if() {
        let list = TestList::new();
        let node = list.push_right(4);

        assert!(node.insert_after_if(5, |v| *v == 3).is_none());
        let inserted = node.insert_after_if(5, |v| *v == 4).unwrap();
        assert_eq!(*inserted.value().unwrap(), 5);
        assert!(list.head().insert_after_if(0, |_| true).is_none());
        assert!(list.tail().insert_after_if(0, |_| true).is_none());

        assert!(node.remove());
        assert!(node.insert_after_if(6, |_| true).is_none());
        assert_eq!(list.to_vec(), vec![5]);
    }

    #[test]
    fn test_handle_keeps_list_alive() {
        let node = {
            let list = TestList::new();
            list.push_right(1);
            list.push_right(2)
        };
        assert_eq!(node.list().to_vec(), vec![1, 2]);
        assert_eq!(*node.prev().unwrap().value().unwrap(), 1);
    }

    #[test]
    fn test_debug_output_mentions_value() {
        let list = TestList::new();
        let node = list.push_right(42);
        let rendered = format!("{:?}", node);
        assert!(rendered.contains("42"));
        assert!(rendered.contains("Data"));
    }
}
