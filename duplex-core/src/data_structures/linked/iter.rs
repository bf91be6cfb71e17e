use std::sync::Arc;

use crate::guard::Guard;

use super::list::ListCore;
use super::node::NodeRef;

/// Forward iterator over the values of a list.
///
/// Each step pins its own read guard, so the iterator can be held across
/// other list operations. Nodes removed ahead of the cursor are skipped;
/// nodes inserted ahead of it may or may not be seen.
pub struct Iter<T, G: Guard> {
    list: Arc<ListCore<T, G>>,
    cursor: NodeRef<T>,
}

impl<T, G: Guard> Iter<T, G> {
    pub(crate) fn new(list: Arc<ListCore<T, G>>) -> Self {
        let cursor = Arc::clone(&list.head);
        Iter { list, cursor }
    }
}

impl<T, G: Guard> Iterator for Iter<T, G> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let pin = G::pin();
        if !self.list.to_next(&mut self.cursor, &pin) || self.cursor.is_tail() {
            return None;
        }
        self.cursor.next.load(&pin).value().cloned()
    }
}

impl<T, G: Guard> std::iter::FusedIterator for Iter<T, G> {}
