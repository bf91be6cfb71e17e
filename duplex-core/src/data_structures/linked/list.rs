use std::fmt;
use std::ptr;
use std::sync::{Arc, Weak};

use crossbeam::utils::Backoff;
use log::{debug, trace};

use crate::data_structures::internal::{AtomicLink, Link};
use crate::guard::Guard;

use super::iter::Iter;
use super::node::{Node, NodeInner, NodeKind, NodeRef, NextTarget, PrevLink};

///
/// Concurrent doubly-linked list based on Sundell and Tsigas,
/// 'Lock-free deques and doubly linked lists'.
///
// =============================================================================
// LINK CELLS
// =============================================================================
//
// Every node owns two cells, each holding an immutable tuple:
//
//   prev = (target, marked)              hint, repaired lazily
//   next = (value, (target, marked))     authoritative chain
//
// The mark on `next` is the deletion flag. Once set, `next.target` of that
// node never changes again. The mark on `prev` only tells correct_prev that
// the node is on its way out.
//
// =============================================================================
// REMOVE (mark, then unlink)
// =============================================================================
//
// Before:   prev ──────► node ──────► next
//
// Step 1 - mark node.next (linearization point, exactly one winner):
//           prev ──────► node ══╳═══► next
//
// Step 2 - mark node.prev, then correct_prev(prev, next) swings prev.next
//          past the node and points next.prev back at prev:
//           prev ───────────────────► next
//                ◄───────────────────
//                        node ══╳═══► next   (frozen, still readable)
//
// Any traversal that meets a marked node finishes step 2 on its behalf.
//
// =============================================================================
// INSERT (publish, then fix prev)
// =============================================================================
//
//   1. Build a private node with prev = (P, false), next = (N, false).
//   2. CAS P.next from (N, false) to (node, false). This publishes the node.
//   3. Best-effort CAS of N.prev to (node, false) (push_end), falling back
//      to correct_prev whenever the node was removed in between.
//
// A failed step 2 means P gained a new successor or was removed; the insert
// re-derives its neighbours and retries with backoff.
//
// =============================================================================
//
pub(crate) struct ListCore<T, G: Guard> {
    // Field order matters: the sentinels drop before the guard releases the
    // tuples it still holds.
    pub(crate) head: NodeRef<T>,
    pub(crate) tail: NodeRef<T>,
    /// Shared guard for every retired link tuple of this list.
    pub(crate) guard: G,
}

impl<T, G: Guard> ListCore<T, G> {
    fn new() -> Self {
        let tail = Arc::new(NodeInner::new(NodeKind::Tail, None, Weak::new(), None));
        let head = Arc::new(NodeInner::new(
            NodeKind::Head,
            None,
            Weak::new(),
            Some(Arc::clone(&tail)),
        ));
        // Safety: neither sentinel has been shared yet.
        unsafe { tail.prev.reset(Link::new(Arc::downgrade(&head), false)) };
        ListCore {
            head,
            tail,
            guard: G::default(),
        }
    }

    // =========================================================================
    // Link helpers
    // =========================================================================

    /// Resolve a back link. A target that is already gone falls back to head.
    fn upgrade_or_head(&self, target: &Weak<NodeInner<T>>) -> NodeRef<T> {
        match target.upgrade() {
            Some(node) => node,
            None => {
                trace!("back link target reclaimed, resuming from head");
                Arc::clone(&self.head)
            }
        }
    }

    #[inline]
    pub(crate) fn prev_of(&self, node: &NodeInner<T>, pin: &G::ReadGuard) -> NodeRef<T> {
        self.upgrade_or_head(node.prev.load(pin).target())
    }

    /// Forward target of `node`. Tail is its own successor.
    #[inline]
    pub(crate) fn next_of(&self, node: &NodeInner<T>, pin: &G::ReadGuard) -> NodeRef<T> {
        match node.next.load(pin).link().target() {
            Some(next) => Arc::clone(next),
            None => Arc::clone(&self.tail),
        }
    }

    /// Mark a `prev` cell once. Already marked cells are left alone.
    pub(crate) fn set_mark(&self, cell: &AtomicLink<PrevLink<T>>, pin: &G::ReadGuard) {
        let _ = cell.fetch_update(&self.guard, pin, |current| {
            (!current.is_marked()).then(|| current.to_marked())
        });
    }

    /// CAS the link half of `node.next` from `(expected, expected_mark)` to
    /// `new`, carrying forward whatever value the cell holds at that moment.
    pub(crate) fn cas_next_link(
        &self,
        node: &NodeInner<T>,
        expected: &NodeRef<T>,
        expected_mark: bool,
        new: Link<NextTarget<T>>,
        pin: &G::ReadGuard,
    ) -> bool {
        node.next
            .fetch_update(&self.guard, pin, |current| {
                current
                    .link()
                    .is(expected, expected_mark)
                    .then(|| current.with_link(new.clone()))
            })
            .is_ok()
    }

    // =========================================================================
    // Back link repair
    // =========================================================================

    /// Make `node.prev` point at its true predecessor, starting the search at
    /// `prev`. Removed nodes met on the way are unlinked.
    ///
    /// Returns the predecessor found. Stops early once `node` itself has been
    /// marked, in which case the result has no particular meaning.
    pub(crate) fn correct_prev(
        &self,
        prev: NodeRef<T>,
        node: &NodeRef<T>,
        pin: &G::ReadGuard,
    ) -> NodeRef<T> {
        let backoff = Backoff::new();
        let mut prev = prev;
        let mut last_link: Option<NodeRef<T>> = None;

        loop {
            let link1 = node.prev.load(pin);
            if link1.is_marked() {
                break;
            }

            let (prev_removed, successor) = {
                let prev2 = prev.next.load(pin).link();
                (prev2.is_marked(), prev2.target().clone())
            };

            if prev_removed {
                match last_link.take() {
                    Some(last) => {
                        self.set_mark(&prev.prev, pin);
                        self.cas_next_link(&last, &prev, false, Link::new(successor, false), pin);
                        prev = last;
                    }
                    None => {
                        prev = self.prev_of(&prev, pin);
                    }
                }
                continue;
            }

            let Some(successor) = successor else {
                // Walked off the end: node was unlinked but its prev mark is
                // not visible yet.
                trace!("correct_prev passed tail, restarting from head");
                prev = Arc::clone(&self.head);
                last_link = None;
                backoff.snooze();
                continue;
            };

            if !Arc::ptr_eq(&successor, node) {
                last_link = Some(prev);
                prev = successor;
                continue;
            }

            let repaired = Link::new(Arc::downgrade(&prev), false);
            if node
                .prev
                .compare_exchange_if(repaired, |current| ptr::eq(current, link1), &self.guard, pin)
            {
                if prev.prev.load(pin).is_marked() {
                    continue;
                }
                break;
            }
            backoff.snooze();
        }
        prev
    }

    /// Point `next.prev` at a freshly published `node`.
    fn push_end(&self, node: &NodeRef<T>, next: &NodeRef<T>, pin: &G::ReadGuard) {
        let backoff = Backoff::new();
        loop {
            let link1 = next.prev.load(pin);
            if link1.is_marked() || !node.next.load(pin).link().is(next, false) {
                break;
            }
            let fresh = Link::new(Arc::downgrade(node), false);
            if next
                .prev
                .compare_exchange_if(fresh, |current| ptr::eq(current, link1), &self.guard, pin)
            {
                if node.prev.load(pin).is_marked() {
                    self.correct_prev(Arc::clone(node), next, pin);
                }
                break;
            }
            backoff.snooze();
        }
    }

    // =========================================================================
    // Ends of the list
    // =========================================================================

    pub(crate) fn push_left(&self, value: T, pin: &G::ReadGuard) -> NodeRef<T> {
        let backoff = Backoff::new();
        let node = NodeInner::data(value);
        let prev = &self.head;
        let mut next = self.next_of(prev, pin);
        loop {
            // Safety: node is published only by the CAS below.
            unsafe { node.attach(prev, &next) };
            let published = Link::new(Some(Arc::clone(&node)), false);
            if self.cas_next_link(prev, &next, false, published, pin) {
                break;
            }
            next = self.next_of(prev, pin);
            backoff.snooze();
        }
        self.push_end(&node, &next, pin);
        node
    }

    pub(crate) fn push_right(&self, value: T, pin: &G::ReadGuard) -> NodeRef<T> {
        let backoff = Backoff::new();
        let node = NodeInner::data(value);
        let next = &self.tail;
        let mut prev = self.prev_of(next, pin);
        loop {
            // Safety: node is published only by the CAS below.
            unsafe { node.attach(&prev, next) };
            let published = Link::new(Some(Arc::clone(&node)), false);
            if self.cas_next_link(&prev, next, false, published, pin) {
                break;
            }
            prev = self.correct_prev(prev, next, pin);
            backoff.snooze();
        }
        self.push_end(&node, next, pin);
        node
    }

    pub(crate) fn pop_right_node(&self, pin: &G::ReadGuard) -> Option<NodeRef<T>> {
        let backoff = Backoff::new();
        let next = &self.tail;
        let mut node = self.prev_of(next, pin);
        loop {
            if !node.next.load(pin).link().is(next, false) {
                node = self.correct_prev(node, next, pin);
                continue;
            }
            if node.is_head() {
                debug!("pop_right_node on an empty list");
                return None;
            }
            let marked = Link::new(Some(Arc::clone(next)), true);
            if self.cas_next_link(&node, next, false, marked, pin) {
                self.set_mark(&node.prev, pin);
                let prev = self.prev_of(&node, pin);
                self.correct_prev(prev, next, pin);
                return Some(node);
            }
            backoff.snooze();
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Advance `cursor` to the next live node, helping to unlink removed
    /// successors on the way. Returns false when `cursor` is already tail.
    ///
    /// Tail counts as live, so the cursor may end on it.
    pub(crate) fn to_next(&self, cursor: &mut NodeRef<T>, pin: &G::ReadGuard) -> bool {
        loop {
            if cursor.is_tail() {
                return false;
            }
            let next = self.next_of(cursor, pin);
            let removed = next.is_removed(pin);
            if removed && !cursor.next.load(pin).link().is(&next, true) {
                trace!("unlinking removed successor during forward walk");
                self.set_mark(&next.prev, pin);
                let beyond = next.next.load(pin).link().target().clone();
                self.cas_next_link(cursor, &next, false, Link::new(beyond, false), pin);
                continue;
            }
            *cursor = next;
            if !removed {
                return true;
            }
        }
    }

    /// Move `cursor` to its live predecessor. Returns false at head.
    ///
    /// A removed cursor is first moved forward to a live node.
    pub(crate) fn to_prev(&self, cursor: &mut NodeRef<T>, pin: &G::ReadGuard) -> bool {
        loop {
            if cursor.is_head() {
                return false;
            }
            let prev = self.prev_of(cursor, pin);
            let linked = prev.next.load(pin).link().is(&*cursor, false);
            if linked && !cursor.is_removed(pin) {
                *cursor = prev;
                return true;
            }
            if cursor.is_removed(pin) {
                self.to_next(cursor, pin);
            } else {
                self.correct_prev(prev, cursor, pin);
            }
        }
    }

    // =========================================================================
    // Insertion next to an arbitrary node
    // =========================================================================

    pub(crate) fn link_before(
        &self,
        anchor: &NodeRef<T>,
        node: NodeRef<T>,
        pin: &G::ReadGuard,
    ) -> NodeRef<T> {
        if anchor.is_head() {
            return self.link_after(anchor, node, pin);
        }
        let backoff = Backoff::new();
        let mut cursor = Arc::clone(anchor);
        let mut prev = self.prev_of(&cursor, pin);
        loop {
            while cursor.is_removed(pin) {
                // Re-anchor on the live successor and derive its predecessor
                // from scratch; the old prev says nothing about the new cursor.
                self.to_next(&mut cursor, pin);
                prev = self.prev_of(&cursor, pin);
                prev = self.correct_prev(prev, &cursor, pin);
            }
            // Safety: node is published only by the CAS below.
            unsafe { node.attach(&prev, &cursor) };
            let published = Link::new(Some(Arc::clone(&node)), false);
            if self.cas_next_link(&prev, &cursor, false, published, pin) {
                break;
            }
            prev = self.correct_prev(prev, &cursor, pin);
            backoff.snooze();
        }
        self.correct_prev(prev, &cursor, pin);
        node
    }

    pub(crate) fn link_after(
        &self,
        anchor: &NodeRef<T>,
        node: NodeRef<T>,
        pin: &G::ReadGuard,
    ) -> NodeRef<T> {
        if anchor.is_tail() {
            return self.link_before(anchor, node, pin);
        }
        let backoff = Backoff::new();
        let next = loop {
            let next = self.next_of(anchor, pin);
            // Safety: node is published only by the CAS below.
            unsafe { node.attach(anchor, &next) };
            let published = Link::new(Some(Arc::clone(&node)), false);
            if self.cas_next_link(anchor, &next, false, published, pin) {
                break next;
            }
            if anchor.is_removed(pin) {
                return self.link_before(anchor, node, pin);
            }
            backoff.snooze();
        };
        self.correct_prev(Arc::clone(anchor), &next, pin);
        node
    }

    pub(crate) fn link_after_if<F>(
        &self,
        anchor: &NodeRef<T>,
        node: NodeRef<T>,
        predicate: F,
        pin: &G::ReadGuard,
    ) -> Option<NodeRef<T>>
    where
        F: Fn(&T) -> bool,
    {
        let backoff = Backoff::new();
        let next = loop {
            let next = self.next_of(anchor, pin);
            // Safety: node is published only by the CAS below.
            unsafe { node.attach(anchor, &next) };
            let mut declined = false;
            let outcome = anchor.next.fetch_update(&self.guard, pin, |current| {
                declined = !current.value().is_some_and(|value| predicate(value.as_ref()));
                if declined || !current.link().is(&next, false) {
                    return None;
                }
                Some(current.with_link(Link::new(Some(Arc::clone(&node)), false)))
            });
            match outcome {
                Ok(_) => break next,
                Err(observed) if declined || observed.link().is_marked() => return None,
                Err(_) => backoff.snooze(),
            }
        };
        self.correct_prev(Arc::clone(anchor), &next, pin);
        Some(node)
    }

    // =========================================================================
    // Deletion of an arbitrary node
    // =========================================================================

    pub(crate) fn unlink(&self, node: &NodeRef<T>, pin: &G::ReadGuard) -> bool {
        let marked = node.next.fetch_update(&self.guard, pin, |current| {
            let link = current.link();
            (!link.is_marked()).then(|| current.with_link(link.to_marked()))
        });
        let Ok(previous) = marked else {
            return false;
        };
        let next = match previous.link().target() {
            Some(next) => Arc::clone(next),
            None => Arc::clone(&self.tail),
        };
        self.set_mark(&node.prev, pin);
        let prev = self.prev_of(node, pin);
        self.correct_prev(prev, &next, pin);
        true
    }
}

/// A lock-free doubly-linked list.
///
/// `List` is a cheap handle: clones share the same nodes. Every operation
/// may run concurrently with any other from any number of threads.
///
/// # Example
///
/// ```rust
/// use duplex_core::{DeferredGuard, List};
///
/// let list: List<i32, DeferredGuard> = List::new();
/// let two = list.push_right(2);
/// list.push_left(1);
/// two.insert_after(3);
/// assert_eq!(list.to_vec(), vec![1, 2, 3]);
///
/// assert!(two.remove());
/// assert_eq!(list.pop_right().as_deref(), Some(&3));
/// assert_eq!(list.to_vec(), vec![1]);
/// ```
///
/// Replaced values may be released by whichever thread reclaims retired
/// link tuples, so values must be `Send + Sync`:
///
/// ```compile_fail
/// use duplex_core::{DeferredGuard, List};
///
/// let list: List<std::rc::Rc<i32>, DeferredGuard> = List::new();
/// ```
pub struct List<T, G: Guard> {
    core: Arc<ListCore<T, G>>,
}

impl<T: Send + Sync, G: Guard> List<T, G> {
    /// Empty list. Every list is created here, so every value type that
    /// ever enters a list is `Send + Sync`.
    pub fn new() -> Self {
        List {
            core: Arc::new(ListCore::new()),
        }
    }
}

impl<T, G: Guard> List<T, G> {
    pub(crate) fn from_core(core: Arc<ListCore<T, G>>) -> Self {
        List { core }
    }

    fn wrap(&self, node: NodeRef<T>) -> Node<T, G> {
        Node::from_parts(Arc::clone(&self.core), node)
    }

    /// The head sentinel; `head().next()` is the first data node.
    pub fn head(&self) -> Node<T, G> {
        self.wrap(Arc::clone(&self.core.head))
    }

    /// The tail sentinel; `tail().prev()` is the last data node.
    pub fn tail(&self) -> Node<T, G> {
        self.wrap(Arc::clone(&self.core.tail))
    }

    pub fn push_left(&self, value: T) -> Node<T, G> {
        let pin = G::pin();
        let node = self.core.push_left(value, &pin);
        self.wrap(node)
    }

    pub fn push_right(&self, value: T) -> Node<T, G> {
        let pin = G::pin();
        let node = self.core.push_right(value, &pin);
        self.wrap(node)
    }

    /// Remove and return the rightmost node, `None` if the list is empty.
    pub fn pop_right_node(&self) -> Option<Node<T, G>> {
        let pin = G::pin();
        self.core.pop_right_node(&pin).map(|node| self.wrap(node))
    }

    /// Remove the rightmost node and read its value.
    ///
    /// Not atomic: the value is read after the removal, so a concurrent
    /// `set_value` on the popped node may be observed. Use
    /// [`List::pop_right_node`] when that matters.
    pub fn pop_right(&self) -> Option<Arc<T>> {
        self.pop_right_node().and_then(|node| node.value().ok())
    }

    /// Lazy forward iteration over the values of live nodes.
    pub fn iter(&self) -> Iter<T, G> {
        Iter::new(Arc::clone(&self.core))
    }

    /// Snapshot of the values, not atomic with respect to other threads.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().map(|value| T::clone(&value)).collect()
    }

    /// Number of live data nodes met by a forward walk.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Whether both handles refer to the same list.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T: Send + Sync, G: Guard> Default for List<T, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, G: Guard> Clone for List<T, G> {
    fn clone(&self) -> Self {
        List::from_core(Arc::clone(&self.core))
    }
}

impl<T: Send + Sync, G: Guard> FromIterator<T> for List<T, G> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = List::new();
        list.extend(iter);
        list
    }
}

impl<T, G: Guard> Extend<T> for List<T, G> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let pin = G::pin();
        for value in iter {
            self.core.push_right(value, &pin);
        }
    }
}

impl<'a, T, G: Guard> IntoIterator for &'a List<T, G> {
    type Item = Arc<T>;
    type IntoIter = Iter<T, G>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug, G: Guard> fmt::Debug for List<T, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
