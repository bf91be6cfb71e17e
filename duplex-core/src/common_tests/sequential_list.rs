//! Single-threaded reference list used to replay concurrent histories.
//!
//! Removed entries stay in place as tombstones. A cursor resting on a
//! removed node of the concurrent list still has a well-defined position
//! relative to later inserts, and tombstones reproduce that position: new
//! entries are placed in front of any run of tombstones they are inserted
//! next to, the same way a frozen `next` link of a removed node skips nodes
//! inserted after its removal.

/// Identity of an entry, stable across inserts and removals.
pub type Key = usize;

#[derive(Clone, Debug)]
struct Entry<V> {
    key: Key,
    value: V,
    removed: bool,
}

#[derive(Clone, Debug)]
pub struct SequentialList<V> {
    entries: Vec<Entry<V>>,
    next_key: Key,
}

impl<V: Clone> SequentialList<V> {
    pub fn new() -> Self {
        SequentialList {
            entries: Vec::new(),
            next_key: 0,
        }
    }

    /// Keys of the initial values, in order.
    pub fn with_values(values: impl IntoIterator<Item = V>) -> (Self, Vec<Key>) {
        let mut list = Self::new();
        let keys = values.into_iter().map(|v| list.push_right(v)).collect();
        (list, keys)
    }

    fn entry(&self, value: V) -> Entry<V> {
        Entry {
            key: self.next_key,
            value,
            removed: false,
        }
    }

    fn insert_at(&mut self, index: usize, value: V) -> Key {
        let entry = self.entry(value);
        let key = entry.key;
        self.next_key += 1;
        self.entries.insert(index, entry);
        key
    }

    fn position(&self, key: Key) -> usize {
        self.entries
            .iter()
            .position(|entry| entry.key == key)
            .unwrap_or_else(|| panic!("unknown key {key}"))
    }

    /// Start of the tombstone run that ends right before `index`.
    fn before_tombstones(&self, mut index: usize) -> usize {
        while index > 0 && self.entries[index - 1].removed {
            index -= 1;
        }
        index
    }

    pub fn push_left(&mut self, value: V) -> Key {
        self.insert_at(0, value)
    }

    pub fn push_right(&mut self, value: V) -> Key {
        let index = self.before_tombstones(self.entries.len());
        self.insert_at(index, value)
    }

    pub fn insert_before(&mut self, key: Key, value: V) -> Key {
        let index = self.before_tombstones(self.position(key));
        self.insert_at(index, value)
    }

    /// Directly after a live entry; a removed anchor behaves like
    /// `insert_before` on itself.
    pub fn insert_after(&mut self, key: Key, value: V) -> Key {
        let index = self.position(key);
        if self.entries[index].removed {
            self.insert_before(key, value)
        } else {
            self.insert_at(index + 1, value)
        }
    }

    pub fn insert_after_if(
        &mut self,
        key: Key,
        value: V,
        predicate: impl Fn(&V) -> bool,
    ) -> Option<Key> {
        let index = self.position(key);
        let anchor = &self.entries[index];
        if anchor.removed || !predicate(&anchor.value) {
            return None;
        }
        Some(self.insert_at(index + 1, value))
    }

    /// Next live entry after `key`. From no position, the last live entry.
    pub fn next(&self, key: Option<Key>) -> Option<Key> {
        match key {
            None => self.entries.iter().rev().find(|e| !e.removed).map(|e| e.key),
            Some(key) => self.entries[self.position(key) + 1..]
                .iter()
                .find(|e| !e.removed)
                .map(|e| e.key),
        }
    }

    /// Previous live entry before `key`. From no position, the first live entry.
    pub fn prev(&self, key: Option<Key>) -> Option<Key> {
        match key {
            None => self.entries.iter().find(|e| !e.removed).map(|e| e.key),
            Some(key) => self.entries[..self.position(key)]
                .iter()
                .rev()
                .find(|e| !e.removed)
                .map(|e| e.key),
        }
    }

    pub fn remove(&mut self, key: Key) -> bool {
        let index = self.position(key);
        let entry = &mut self.entries[index];
        !std::mem::replace(&mut entry.removed, true)
    }

    pub fn pop_right(&mut self) -> Option<Key> {
        let entry = self.entries.iter_mut().rev().find(|e| !e.removed)?;
        entry.removed = true;
        Some(entry.key)
    }

    pub fn value(&self, key: Key) -> &V {
        &self.entries[self.position(key)].value
    }

    pub fn set_value(&mut self, key: Key, value: V) {
        let index = self.position(key);
        self.entries[index].value = value;
    }

    pub fn is_removed(&self, key: Key) -> bool {
        self.entries[self.position(key)].removed
    }

    pub fn live_values(&self) -> Vec<V> {
        self.entries
            .iter()
            .filter(|e| !e.removed)
            .map(|e| e.value.clone())
            .collect()
    }
}

impl<V: Clone> Default for SequentialList<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tombstones_hide_from_traversal() {
        let (mut list, keys) = SequentialList::with_values([0, 1, 2, 3]);
        assert!(list.remove(keys[1]));
        assert!(!list.remove(keys[1]));
        assert_eq!(list.live_values(), vec![0, 2, 3]);
        assert_eq!(list.next(Some(keys[0])), Some(keys[2]));
        assert_eq!(list.prev(Some(keys[2])), Some(keys[0]));
        // From the tombstone itself.
        assert_eq!(list.next(Some(keys[1])), Some(keys[2]));
        assert_eq!(list.prev(Some(keys[1])), Some(keys[0]));
    }

    #[test]
    fn test_no_position_wraps_to_ends() {
        let (list, keys) = SequentialList::with_values([5, 6]);
        assert_eq!(list.next(None), Some(keys[1]));
        assert_eq!(list.prev(None), Some(keys[0]));
        assert_eq!(list.next(Some(keys[1])), None);
        assert_eq!(list.prev(Some(keys[0])), None);
    }

    #[test]
    fn test_inserts_land_before_tombstone_runs() {
        let (mut list, keys) = SequentialList::with_values([0, 1, 2]);
        list.remove(keys[1]);

        let x = list.insert_after(keys[1], 10);
        assert_eq!(list.live_values(), vec![0, 10, 2]);
        // The removed anchor still sees the old successor next.
        assert_eq!(list.next(Some(keys[1])), Some(keys[2]));
        assert_eq!(list.prev(Some(keys[1])), Some(x));

        list.insert_before(keys[2], 11);
        assert_eq!(list.live_values(), vec![0, 10, 11, 2]);
        assert_eq!(list.next(Some(keys[1])), Some(keys[2]));
    }

    #[test]
    fn test_push_right_goes_before_popped_tail() {
        let (mut list, keys) = SequentialList::with_values([1, 2]);
        assert_eq!(list.pop_right(), Some(keys[1]));
        let pushed = list.push_right(3);
        assert_eq!(list.live_values(), vec![1, 3]);
        assert_eq!(list.next(Some(keys[1])), None);
        assert_eq!(list.prev(Some(keys[1])), Some(pushed));
    }

    #[test]
    fn test_insert_after_if_and_values() {
        let (mut list, keys) = SequentialList::with_values([7]);
        assert_eq!(list.insert_after_if(keys[0], 8, |v| *v == 6), None);
        let inserted = list.insert_after_if(keys[0], 8, |v| *v == 7);
        assert!(inserted.is_some());
        list.set_value(keys[0], 9);
        assert_eq!(*list.value(keys[0]), 9);
        list.remove(keys[0]);
        assert!(list.is_removed(keys[0]));
        assert_eq!(list.insert_after_if(keys[0], 1, |_| true), None);
        assert_eq!(list.live_values(), vec![8]);
    }
}
