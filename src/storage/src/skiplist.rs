// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! A sorted list with lock-free readers and single-writer inserts.
//!
//! Writers must be serialized externally (the segment holds a mutex per
//! writer scope); readers walk the list concurrently without any lock. A
//! node is published bottom level first with release stores, so a reader
//! that observes a node through any level always sees a consistent suffix
//! of the list from that node on.

use std::{
    cmp::Ordering,
    marker::PhantomData,
    ptr,
    sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering::*},
};

pub const MAX_HEIGHT: usize = 12;
const BRANCHING: u64 = 4;
const RND_SEED: u64 = 0xdead_beef;

/// Total order of node keys in list position.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Ascending byte-wise order, used for primary keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct AscendingBytes;

impl KeyComparator<Vec<u8>> for AscendingBytes {
    #[inline]
    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> Ordering {
        a.as_slice().cmp(b.as_slice())
    }
}

/// Descending time order: the head of the list is the newest write.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescendingTime;

impl KeyComparator<u64> for DescendingTime {
    #[inline]
    fn compare(&self, a: &u64, b: &u64) -> Ordering {
        b.cmp(a)
    }
}

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    nexts: Box<[AtomicPtr<Node<K, V>>]>,
}

impl<K, V> Node<K, V> {
    fn alloc(key: K, value: V, height: usize) -> *mut Node<K, V> {
        let nexts = (0..height)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Box::into_raw(Box::new(Node { key, value, nexts }))
    }

    #[inline]
    pub(crate) fn next0(&self) -> *const Node<K, V> {
        self.nexts[0].load(Acquire)
    }
}

pub struct Skiplist<K, V, C> {
    head: Box<[AtomicPtr<Node<K, V>>]>,
    max_height: AtomicUsize,
    len: AtomicUsize,
    rnd: AtomicU64,
    cmp: C,
}

unsafe impl<K: Send, V: Send, C: Send> Send for Skiplist<K, V, C> {}
unsafe impl<K: Send + Sync, V: Send + Sync, C: Sync> Sync for Skiplist<K, V, C> {}

impl<K, V, C: KeyComparator<K>> Skiplist<K, V, C> {
    pub fn new(cmp: C) -> Self {
        let head = (0..MAX_HEIGHT)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            head,
            max_height: AtomicUsize::new(1),
            len: AtomicUsize::new(0),
            rnd: AtomicU64::new(RND_SEED),
            cmp,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn random_height(&self) -> usize {
        let mut x = self.rnd.load(Relaxed);
        let mut height = 1;
        loop {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            if height < MAX_HEIGHT && x % BRANCHING == 0 {
                height += 1;
            } else {
                break;
            }
        }
        self.rnd.store(x, Relaxed);
        height
    }

    /// Find the first node that is at-or-after the position described by
    /// `ord_of` and optionally collect, per level, the link cell pointing
    /// into that position.
    ///
    /// `ord_of(key)` must return the list-order position of a node key
    /// relative to the target and be monotone over the list.
    fn find_ge_by(
        &self,
        ord_of: impl Fn(&K) -> Ordering,
        mut prevs: Option<&mut [*const AtomicPtr<Node<K, V>>; MAX_HEIGHT]>,
    ) -> *const Node<K, V> {
        let mut level = self.max_height.load(Relaxed) - 1;
        let mut links: &[AtomicPtr<Node<K, V>>] = &self.head;
        loop {
            let next = links[level].load(Acquire);
            // Safety: a non-null link target is a published node whose
            // tower height is greater than the level it was read from.
            if !next.is_null() && ord_of(unsafe { &(*next).key }) == Ordering::Less {
                links = unsafe { &(*next).nexts };
                continue;
            }
            if let Some(prevs) = prevs.as_mut() {
                prevs[level] = &links[level] as *const _;
            }
            if level == 0 {
                return next;
            }
            level -= 1;
        }
    }

    /// Insert a `(key, value)` node.
    ///
    /// REQUIRE: writers are serialized by the caller. Keys may repeat; a
    /// new node lands before existing nodes of the same key.
    pub fn insert(&self, key: K, value: V) {
        let mut prevs = [ptr::null(); MAX_HEIGHT];
        self.find_ge_by(|k| self.cmp.compare(k, &key), Some(&mut prevs));

        let height = self.random_height();
        let max_height = self.max_height.load(Relaxed);
        if height > max_height {
            for level in max_height..height {
                prevs[level] = &self.head[level] as *const _;
            }
            // Readers racing with this store simply keep searching from a
            // lower level.
            self.max_height.store(height, Relaxed);
        }

        let node = Node::alloc(key, value, height);
        for level in 0..height {
            // Safety: prevs was filled for every level below `height`.
            let prev_link = unsafe { &*prevs[level] };
            unsafe {
                (*node).nexts[level].store(prev_link.load(Relaxed), Relaxed);
            }
            // Publish bottom level first.
            prev_link.store(node, Release);
        }
        self.len.fetch_add(1, Relaxed);
    }

    /// Lock-free lookup, returns the value of the first node matching
    /// `key` in list order.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_with(|k| self.cmp.compare(k, key))
    }

    /// Lock-free lookup with a caller-supplied position function, see
    /// [Self::find_ge_by].
    pub fn get_with(&self, ord_of: impl Fn(&K) -> Ordering) -> Option<&V> {
        let node = self.find_ge_by(&ord_of, None);
        if node.is_null() {
            return None;
        }
        // Safety: published node, values are never mutated in place.
        unsafe {
            if ord_of(&(*node).key) == Ordering::Equal {
                Some(&(*node).value)
            } else {
                None
            }
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V, C> {
        Iter {
            list: self,
            node: ptr::null(),
        }
    }

    #[inline]
    pub(crate) fn raw_first(&self) -> *const Node<K, V> {
        self.head[0].load(Acquire)
    }

    #[inline]
    pub(crate) fn raw_seek(&self, ord_of: impl Fn(&K) -> Ordering) -> *const Node<K, V> {
        self.find_ge_by(ord_of, None)
    }

    /// Detach every node strictly after `key`'s position (in a descending
    /// time list: every node older than `key`).
    ///
    /// REQUIRE: serialized with writers, and no reader is inside the list
    /// (the segment skips the split of a pinned entry).
    pub fn split(&self, key: &K) -> Option<DetachedNodes<K, V>> {
        self.split_by(|k| match self.cmp.compare(k, key) {
            Ordering::Greater => Boundary::Detach,
            _ => Boundary::Keep,
        })
    }

    /// Detach every node at-or-after `key`'s position (in a descending
    /// time list: `key` itself, its duplicates and everything older).
    ///
    /// REQUIRE: same as [Self::split].
    pub fn split_from(&self, key: &K) -> Option<DetachedNodes<K, V>> {
        self.split_by(|k| match self.cmp.compare(k, key) {
            Ordering::Less => Boundary::Keep,
            _ => Boundary::Detach,
        })
    }

    /// Detach the whole list. REQUIRE: same as [Self::split].
    pub fn take_all(&self) -> Option<DetachedNodes<K, V>> {
        self.split_by(|_| Boundary::Detach)
    }

    fn split_by(&self, side_of: impl Fn(&K) -> Boundary) -> Option<DetachedNodes<K, V>> {
        let max_height = self.max_height.load(Relaxed);
        let mut prevs = [ptr::null::<AtomicPtr<Node<K, V>>>(); MAX_HEIGHT];
        let mut level = max_height - 1;
        let mut links: &[AtomicPtr<Node<K, V>>] = &self.head;
        let target = loop {
            let next = links[level].load(Relaxed);
            // Safety: see find_ge_by; the kept prefix is suffix-closed
            // because the list is sorted.
            if !next.is_null() && matches!(side_of(unsafe { &(*next).key }), Boundary::Keep) {
                links = unsafe { &(*next).nexts };
                continue;
            }
            prevs[level] = &links[level] as *const _;
            if level == 0 {
                break next;
            }
            level -= 1;
        };

        if target.is_null() {
            return None;
        }
        for prev in prevs.iter().take(max_height) {
            // Safety: each collected link targets either null or a
            // detached node; severing makes the suffix unreachable for
            // readers that have not passed it yet.
            unsafe { (**prev).store(ptr::null_mut(), Release) };
        }

        let mut count = 0;
        let mut node = target;
        while !node.is_null() {
            count += 1;
            node = unsafe { (*node).nexts[0].load(Relaxed) };
        }
        self.len.fetch_sub(count, Relaxed);

        Some(DetachedNodes {
            head: target as *mut Node<K, V>,
            _not_send: PhantomData,
        })
    }
}

enum Boundary {
    Keep,
    Detach,
}

impl<K, V, C> Drop for Skiplist<K, V, C> {
    fn drop(&mut self) {
        let mut node = self.head[0].load(Relaxed) as *mut Node<K, V>;
        while !node.is_null() {
            // Safety: exclusive access in drop.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.nexts[0].load(Relaxed);
        }
    }
}

/// Read cursor over the list, newest-to-oldest for a descending time list.
///
/// Tolerates concurrent inserts: the cursor sees a consistent suffix from
/// every node it passes.
pub struct Iter<'a, K, V, C> {
    list: &'a Skiplist<K, V, C>,
    node: *const Node<K, V>,
}

impl<'a, K, V, C: KeyComparator<K>> Iter<'a, K, V, C> {
    pub fn seek_to_first(&mut self) {
        self.node = self.list.raw_first();
    }

    /// Move to the first node at-or-after `key`'s position in list order.
    pub fn seek(&mut self, key: &K) {
        self.node = self.list.raw_seek(|k| self.list.cmp.compare(k, key));
    }

    #[inline]
    pub fn valid(&self) -> bool {
        !self.node.is_null()
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        // Safety: node is valid and published.
        self.node = unsafe { (*self.node).next0() };
    }

    pub fn key(&self) -> &'a K {
        debug_assert!(self.valid());
        unsafe { &(*self.node).key }
    }

    pub fn value(&self) -> &'a V {
        debug_assert!(self.valid());
        unsafe { &(*self.node).value }
    }
}

/// Owning drain over nodes detached by a split.
///
/// Remaining nodes are freed on drop.
pub struct DetachedNodes<K, V> {
    head: *mut Node<K, V>,
    _not_send: PhantomData<*mut ()>,
}

impl<K, V> Iterator for DetachedNodes<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        if self.head.is_null() {
            return None;
        }
        // Safety: detached nodes are owned by this drain exclusively.
        let node = unsafe { Box::from_raw(self.head) };
        self.head = node.nexts[0].load(Relaxed);
        let Node { key, value, .. } = *node;
        Some((key, value))
    }
}

impl<K, V> Drop for DetachedNodes<K, V> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn descending_list() -> Skiplist<u64, u64, DescendingTime> {
        Skiplist::new(DescendingTime)
    }

    fn collect(list: &Skiplist<u64, u64, DescendingTime>) -> Vec<u64> {
        let mut out = Vec::new();
        let mut iter = list.iter();
        iter.seek_to_first();
        while iter.valid() {
            out.push(*iter.key());
            iter.next();
        }
        out
    }

    #[test]
    fn test_insert_and_get() {
        let list = descending_list();
        for time in [100u64, 300, 200, 250, 150] {
            list.insert(time, time * 10);
        }
        assert_eq!(list.len(), 5);
        assert_eq!(collect(&list), vec![300, 250, 200, 150, 100]);
        assert_eq!(list.get(&200), Some(&2000));
        assert_eq!(list.get(&123), None);
    }

    #[test]
    fn test_duplicate_keys() {
        let list = descending_list();
        list.insert(100, 1);
        list.insert(100, 2);
        list.insert(100, 3);
        assert_eq!(list.len(), 3);
        // The newest insert of a duplicate key is the first match.
        assert_eq!(list.get(&100), Some(&3));
        assert_eq!(collect(&list), vec![100, 100, 100]);
    }

    #[test]
    fn test_seek() {
        let list = descending_list();
        for time in [100u64, 200, 300] {
            list.insert(time, 0);
        }
        let mut iter = list.iter();
        // First node with time <= 250 in the descending list.
        iter.seek(&250);
        assert!(iter.valid());
        assert_eq!(*iter.key(), 200);
        iter.seek(&300);
        assert_eq!(*iter.key(), 300);
        iter.seek(&50);
        assert!(!iter.valid());
    }

    #[test]
    fn test_split_is_strict() {
        let list = descending_list();
        for time in [100u64, 200, 300] {
            list.insert(time, 0);
        }
        // Strictly older than 200 only.
        let detached: Vec<_> = list.split(&200).unwrap().map(|(k, _)| k).collect();
        assert_eq!(detached, vec![100]);
        assert_eq!(collect(&list), vec![300, 200]);
        assert_eq!(list.len(), 2);

        assert!(list.split(&100).is_none());
    }

    #[test]
    fn test_split_from_is_inclusive() {
        let list = descending_list();
        for time in [100u64, 200, 200, 300] {
            list.insert(time, 0);
        }
        let detached: Vec<_> = list.split_from(&200).unwrap().map(|(k, _)| k).collect();
        assert_eq!(detached, vec![200, 200, 100]);
        assert_eq!(collect(&list), vec![300]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_take_all() {
        let list = descending_list();
        for time in [100u64, 200] {
            list.insert(time, 0);
        }
        let detached: Vec<_> = list.take_all().unwrap().map(|(k, _)| k).collect();
        assert_eq!(detached, vec![200, 100]);
        assert!(list.is_empty());
        assert!(list.take_all().is_none());
    }

    #[test]
    fn test_detached_drop_frees_rest() {
        let list = descending_list();
        for time in 0..100u64 {
            list.insert(time, time);
        }
        let mut detached = list.split_from(&u64::MAX).unwrap();
        let _ = detached.next();
        // Dropping the drain must free the other 99 nodes (checked by
        // miri/asan builds; here it only must not crash).
        drop(detached);
        assert!(list.is_empty());
    }

    #[test]
    fn test_concurrent_readers() {
        let list = std::sync::Arc::new(descending_list());
        let write_mu = Mutex::new(());

        std::thread::scope(|scope| {
            let reader_list = list.clone();
            let reader = scope.spawn(move || {
                for _ in 0..1000 {
                    let mut iter = reader_list.iter();
                    iter.seek_to_first();
                    let mut prev = u64::MAX;
                    while iter.valid() {
                        let time = *iter.key();
                        assert!(time <= prev);
                        assert_eq!(*iter.value(), time * 7);
                        prev = time;
                        iter.next();
                    }
                }
            });

            for time in 0..2000u64 {
                let _guard = write_mu.lock().unwrap();
                list.insert(time, time * 7);
            }
            reader.join().unwrap();
        });
        assert_eq!(list.len(), 2000);
    }
}
