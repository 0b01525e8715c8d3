// Copyright 2023 CeresDB Project Authors. Licensed under Apache-2.0.

//! Segment: one shard of one table partition's in-memory data.
//!
//! A segment maps primary keys to per-key time lists of row blocks. The
//! read path (get, iterators) is lock-free; the write path takes the
//! segment mutex only to create a key entry and the entry mutex to insert
//! into its time list. Garbage collection detaches expired suffixes of the
//! time lists and skips any entry pinned by a reader [Ticket].

use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering::*},
        Arc, Mutex,
    },
    time::Instant,
};

use bytes::Bytes;
use log::{debug, info};

use crate::skiplist::{AscendingBytes, DescendingTime, Node, Skiplist};

/// An immutable encoded row shared by every index dimension that stores
/// it.
///
/// `dim_cnt` is a downward-counted fan-in set at construction: each
/// segment holding the block owes exactly one [DataBlock::release_dim]
/// when it garbage collects its reference. The block counts as freed when
/// the counter reaches zero (the backing memory follows the last `Arc`).
#[derive(Debug)]
pub struct DataBlock {
    dim_cnt: AtomicU32,
    data: Bytes,
}

impl DataBlock {
    pub fn new(dim_cnt: u32, data: Bytes) -> Arc<Self> {
        Arc::new(Self {
            dim_cnt: AtomicU32::new(dim_cnt),
            data,
        })
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn dim_cnt(&self) -> u32 {
        self.dim_cnt.load(Acquire)
    }

    /// Drop one dimension reference, returns true when it was the last.
    fn release_dim(&self) -> bool {
        self.dim_cnt.fetch_sub(1, AcqRel) == 1
    }
}

type TimeList = Skiplist<u64, Arc<DataBlock>, DescendingTime>;

/// Per-primary-key, time-descending list of row blocks.
///
/// Created on the first put of its key and kept for the segment's
/// lifetime, so repeated expire/insert cycles of a hot key reuse the
/// allocation.
pub struct KeyEntry {
    key: Vec<u8>,
    entries: TimeList,
    readers: AtomicI32,
    mu: Mutex<()>,
}

impl KeyEntry {
    fn new(key: Vec<u8>) -> Self {
        Self {
            key,
            entries: Skiplist::new(DescendingTime),
            readers: AtomicI32::new(0),
            mu: Mutex::new(()),
        }
    }

    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

/// A scoped reader pin.
///
/// Every entry touched through [Segment::new_iterator] is pushed onto the
/// ticket, bumping the entry's reader count; dropping the ticket releases
/// the pins. GC never splits a pinned entry, so every block reachable at
/// the moment of pinning stays alive for the ticket's scope. Iterators
/// borrow the ticket: they cannot outlive it.
#[derive(Default)]
pub struct Ticket {
    pinned: Mutex<Vec<Arc<KeyEntry>>>,
}

impl Ticket {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: Arc<KeyEntry>) {
        // The pin must be visible before the reader loads the list head,
        // see the ordering contract of [Segment].
        entry.readers.fetch_add(1, AcqRel);
        self.pinned.lock().unwrap().push(entry);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        for entry in self.pinned.lock().unwrap().drain(..) {
            entry.readers.fetch_sub(1, Release);
        }
    }
}

/// One shard of one table partition.
pub struct Segment {
    entries: Skiplist<Vec<u8>, Arc<KeyEntry>, AscendingBytes>,
    mu: Mutex<()>,
    data_cnt: AtomicU64,
}

impl Default for Segment {
    fn default() -> Self {
        Self::new()
    }
}

impl Segment {
    pub fn new() -> Self {
        Self {
            entries: Skiplist::new(AscendingBytes),
            mu: Mutex::new(()),
            data_cnt: AtomicU64::new(0),
        }
    }

    /// Advisory row count: puts so far minus nodes freed by GC.
    #[inline]
    pub fn row_count(&self) -> u64 {
        self.data_cnt.load(Relaxed)
    }

    /// Put one encoded row owned by this segment alone.
    pub fn put_raw(&self, key: &[u8], time: u64, data: &[u8]) {
        self.put(key, time, DataBlock::new(1, Bytes::copy_from_slice(data)));
    }

    /// Put a block that may be shared with other segments (one dimension
    /// reference per segment).
    pub fn put(&self, key: &[u8], time: u64, block: Arc<DataBlock>) {
        let entry = match self.lookup(key) {
            Some(entry) => entry,
            None => {
                let _guard = self.mu.lock().unwrap();
                // The lock-free probe above may race with a concurrent
                // inserter of the same key, re-check under the lock.
                match self.lookup(key) {
                    Some(entry) => entry,
                    None => {
                        let entry = Arc::new(KeyEntry::new(key.to_vec()));
                        self.entries.insert(key.to_vec(), entry.clone());
                        entry
                    }
                }
            }
        };
        self.data_cnt.fetch_add(1, Relaxed);
        let _guard = entry.mu.lock().unwrap();
        entry.entries.insert(time, block);
    }

    #[inline]
    fn lookup(&self, key: &[u8]) -> Option<Arc<KeyEntry>> {
        self.entries
            .get_with(|k| k.as_slice().cmp(key))
            .map(Arc::clone)
    }

    /// Lock-free point lookup, returns the newest block at exactly `time`.
    pub fn get(&self, key: &[u8], time: u64) -> Option<Arc<DataBlock>> {
        let entry = self.lookup(key)?;
        let block = entry.entries.get(&time).map(Arc::clone);
        block
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Open a newest-to-oldest iterator over `key`'s time list and pin the
    /// entry through `ticket`.
    ///
    /// The iterator borrows the ticket; dropping the iterator does not
    /// release the pin, the ticket's scope does.
    pub fn new_iterator<'t>(&self, key: &[u8], ticket: &'t Ticket) -> Option<SegmentIterator<'t>> {
        let entry = self.lookup(key)?;
        ticket.push(entry.clone());
        let mut iter = SegmentIterator {
            entry,
            node: std::ptr::null(),
            _ticket: PhantomData,
        };
        iter.seek_to_first();
        Some(iter)
    }

    /// Expire every row strictly older than `cut_time`.
    ///
    /// Entries pinned by a reader are skipped; the next GC pass retries
    /// them. Returns the number of rows freed.
    pub fn gc4_ttl(&self, cut_time: u64) -> u64 {
        let start = Instant::now();
        let mut freed_rows = 0u64;
        let mut freed_blocks = 0u64;

        let mut iter = self.entries.iter();
        iter.seek_to_first();
        while iter.valid() {
            let entry = iter.value();
            let detached = {
                let _guard = entry.mu.lock().unwrap();
                if entry.readers.load(Acquire) <= 0 {
                    entry.entries.split(&cut_time)
                } else {
                    debug!("skip gc of pinned entry, key:{:?}", entry.key);
                    None
                }
            };
            if let Some(nodes) = detached {
                let (rows, blocks) = free_detached(nodes);
                freed_rows += rows;
                freed_blocks += blocks;
            }
            iter.next();
        }

        self.data_cnt.fetch_sub(freed_rows, Relaxed);
        info!(
            "[gc4_ttl] segment gc done, cut_time:{}, elapsed_ms:{}, freed_rows:{}, freed_blocks:{}",
            cut_time,
            start.elapsed().as_millis(),
            freed_rows,
            freed_blocks
        );
        freed_rows
    }

    /// Retain only the `keep_n` most recent rows of every key.
    ///
    /// Returns the number of rows freed.
    pub fn gc4_head(&self, keep_n: usize) -> u64 {
        let start = Instant::now();
        let mut freed_rows = 0u64;
        let mut freed_blocks = 0u64;

        let mut iter = self.entries.iter();
        iter.seek_to_first();
        // The outer cursor advances unconditionally, small entries must
        // not stall the walk.
        while iter.valid() {
            let entry = iter.value();
            iter.next();
            if entry.entries.len() <= keep_n {
                continue;
            }

            // Walk to the (keep_n + 1)-th newest row to obtain the cut
            // time. The walk is lock-free, a racing put only prepends
            // newer rows.
            let mut node = entry.entries.raw_first();
            let mut skipped = 0;
            while !node.is_null() && skipped < keep_n {
                node = unsafe { (*node).next0() };
                skipped += 1;
            }
            let cut_time = match unsafe { node.as_ref() } {
                Some(node) => node.key,
                None => continue,
            };

            let detached = {
                let _guard = entry.mu.lock().unwrap();
                if entry.readers.load(Acquire) <= 0 {
                    entry.entries.split_from(&cut_time)
                } else {
                    None
                }
            };
            if let Some(nodes) = detached {
                let (rows, blocks) = free_detached(nodes);
                freed_rows += rows;
                freed_blocks += blocks;
            }
        }

        self.data_cnt.fetch_sub(freed_rows, Relaxed);
        info!(
            "[gc4_head] segment gc done, keep:{}, elapsed_ms:{}, freed_rows:{}, freed_blocks:{}",
            keep_n,
            start.elapsed().as_millis(),
            freed_rows,
            freed_blocks
        );
        freed_rows
    }

    /// Release every block of the segment, the tablet-unload path.
    ///
    /// REQUIRE: no concurrent reader or writer. Returns the number of
    /// blocks freed.
    pub fn release(&self) -> u64 {
        let mut freed_blocks = 0u64;

        let mut iter = self.entries.iter();
        iter.seek_to_first();
        while iter.valid() {
            let entry = iter.value();
            if let Some(nodes) = entry.entries.take_all() {
                let (_, blocks) = free_detached(nodes);
                freed_blocks += blocks;
            }
            iter.next();
        }
        if let Some(entries) = self.entries.take_all() {
            drop(entries);
        }
        self.data_cnt.store(0, Relaxed);
        freed_blocks
    }
}

fn free_detached(
    nodes: crate::skiplist::DetachedNodes<u64, Arc<DataBlock>>,
) -> (u64, u64) {
    let mut rows = 0;
    let mut blocks = 0;
    for (_, block) in nodes {
        rows += 1;
        if block.release_dim() {
            blocks += 1;
        }
    }
    (rows, blocks)
}

/// Newest-to-oldest iterator over one key entry's time list.
///
/// The `'t` lifetime ties the iterator to the [Ticket] that pins its
/// entry.
pub struct SegmentIterator<'t> {
    entry: Arc<KeyEntry>,
    node: *const Node<u64, Arc<DataBlock>>,
    _ticket: PhantomData<&'t Ticket>,
}

impl<'t> SegmentIterator<'t> {
    pub fn seek_to_first(&mut self) {
        self.node = self.entry.entries.raw_first();
    }

    /// Move to the newest row whose time is at most `time`.
    pub fn seek(&mut self, time: u64) {
        self.node = self.entry.entries.raw_seek(|k| time.cmp(k));
    }

    #[inline]
    pub fn valid(&self) -> bool {
        !self.node.is_null()
    }

    pub fn next(&mut self) {
        debug_assert!(self.valid());
        // Safety: node is valid; the pinned entry's suffix is never
        // detached while the ticket is alive.
        self.node = unsafe { (*self.node).next0() };
    }

    pub fn time(&self) -> u64 {
        debug_assert!(self.valid());
        unsafe { (*self.node).key }
    }

    pub fn value(&self) -> &DataBlock {
        debug_assert!(self.valid());
        unsafe { &(*self.node).value }
    }

    pub fn block(&self) -> Arc<DataBlock> {
        debug_assert!(self.valid());
        unsafe { Arc::clone(&(*self.node).value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_segment(times: &[u64]) -> Segment {
        let segment = Segment::new();
        for time in times {
            segment.put_raw(b"K", *time, format!("row-{time}").as_bytes());
        }
        segment
    }

    fn times_of(segment: &Segment, key: &[u8]) -> Vec<u64> {
        let ticket = Ticket::new();
        let mut out = Vec::new();
        if let Some(mut iter) = segment.new_iterator(key, &ticket) {
            while iter.valid() {
                out.push(iter.time());
                iter.next();
            }
        }
        out
    }

    #[test]
    fn test_put_get() {
        let segment = seed_segment(&[100, 200, 300]);
        assert_eq!(segment.row_count(), 3);

        let block = segment.get(b"K", 200).unwrap();
        assert_eq!(block.data(), b"row-200");
        assert!(segment.get(b"K", 150).is_none());
        assert!(segment.get(b"missing", 200).is_none());
    }

    #[test]
    fn test_iterator_order_and_seek() {
        let segment = seed_segment(&[200, 100, 300]);
        assert_eq!(times_of(&segment, b"K"), vec![300, 200, 100]);

        let ticket = Ticket::new();
        let mut iter = segment.new_iterator(b"K", &ticket).unwrap();
        iter.seek(250);
        assert!(iter.valid());
        assert_eq!(iter.time(), 200);
        assert_eq!(iter.value().data(), b"row-200");

        iter.seek(50);
        assert!(!iter.valid());
    }

    #[test]
    fn test_gc4_ttl_strict_boundary() {
        let segment = seed_segment(&[100, 200, 300]);

        // Strictly older than the cut only: 200 survives a cut at 200.
        let freed = segment.gc4_ttl(200);
        assert_eq!(freed, 1);
        assert_eq!(segment.row_count(), 2);
        assert_eq!(times_of(&segment, b"K"), vec![300, 200]);

        let freed = segment.gc4_ttl(250);
        assert_eq!(freed, 1);
        assert_eq!(times_of(&segment, b"K"), vec![300]);
    }

    #[test]
    fn test_gc4_ttl_pinned_entry_is_skipped() {
        let segment = seed_segment(&[100, 200, 300]);

        let ticket = Ticket::new();
        let iter = segment.new_iterator(b"K", &ticket).unwrap();

        // The pinned entry is skipped entirely.
        assert_eq!(segment.gc4_ttl(250), 0);
        assert_eq!(segment.row_count(), 3);
        drop(iter);
        // The pin lives with the ticket, not the iterator.
        assert_eq!(segment.gc4_ttl(250), 0);
        drop(ticket);

        assert_eq!(segment.gc4_ttl(250), 2);
        assert_eq!(times_of(&segment, b"K"), vec![300]);
        assert_eq!(segment.row_count(), 1);
    }

    #[test]
    fn test_gc4_head_keep_one() {
        let segment = seed_segment(&[100, 200, 300]);

        let freed = segment.gc4_head(1);
        assert_eq!(freed, 2);
        assert_eq!(times_of(&segment, b"K"), vec![300]);
        assert_eq!(segment.row_count(), 1);

        // Idempotent once trimmed.
        assert_eq!(segment.gc4_head(1), 0);
    }

    #[test]
    fn test_gc4_head_duplicate_boundary_times() {
        let segment = seed_segment(&[100, 200, 200, 300]);
        // The cut lands on a duplicated time: the whole tie is dropped.
        let freed = segment.gc4_head(1);
        assert_eq!(freed, 3);
        assert_eq!(times_of(&segment, b"K"), vec![300]);
    }

    #[test]
    fn test_gc4_head_advances_past_small_entries() {
        let segment = Segment::new();
        // A single-row entry ordered before a large one must not stall
        // the outer walk.
        segment.put_raw(b"A", 100, b"a");
        for time in [100, 200, 300] {
            segment.put_raw(b"B", time, b"b");
        }

        let freed = segment.gc4_head(1);
        assert_eq!(freed, 2);
        assert_eq!(times_of(&segment, b"A"), vec![100]);
        assert_eq!(times_of(&segment, b"B"), vec![300]);
    }

    #[test]
    fn test_shared_block_dim_count() {
        let index0 = Segment::new();
        let index1 = Segment::new();
        let block = DataBlock::new(2, Bytes::from_static(b"row"));
        index0.put(b"K", 100, block.clone());
        index1.put(b"name-x", 100, block.clone());

        // The first dimension GC only decrements the fan-in.
        assert_eq!(index0.gc4_ttl(200), 1);
        assert_eq!(block.dim_cnt(), 1);
        // The last dimension GC frees the block.
        assert_eq!(index1.gc4_ttl(200), 1);
        assert_eq!(block.dim_cnt(), 0);
    }

    #[test]
    fn test_release() {
        let segment = Segment::new();
        for key in [&b"a"[..], b"b", b"c"] {
            for time in [100, 200] {
                segment.put_raw(key, time, b"v");
            }
        }
        assert_eq!(segment.row_count(), 6);
        assert_eq!(segment.release(), 6);
        assert_eq!(segment.row_count(), 0);
        assert!(segment.get(b"a", 100).is_none());
    }

    #[test]
    fn test_concurrent_put_and_iterate() {
        let segment = Arc::new(Segment::new());

        std::thread::scope(|scope| {
            for writer in 0..2u64 {
                let segment = segment.clone();
                scope.spawn(move || {
                    for i in 0..1000u64 {
                        // Interleaved keys, both writers hit both keys.
                        let key = if i % 2 == 0 { &b"K"[..] } else { b"other" };
                        segment.put_raw(key, writer * 1000 + i, b"payload");
                    }
                });
            }

            let segment = segment.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    let ticket = Ticket::new();
                    if let Some(mut iter) = segment.new_iterator(b"K", &ticket) {
                        let mut prev = u64::MAX;
                        while iter.valid() {
                            let time = iter.time();
                            assert!(time <= prev);
                            assert_eq!(iter.value().data(), b"payload");
                            prev = time;
                            iter.next();
                        }
                    }
                }
            });
        });

        assert_eq!(segment.row_count(), 2000);
        // The double-checked insert kept a single entry per distinct key.
        assert_eq!(segment.key_count(), 2);
    }

    #[test]
    fn test_count_conservation() {
        let segment = seed_segment(&[100, 200, 300, 400]);
        let mut freed_total = 0;
        freed_total += segment.gc4_ttl(250);
        freed_total += segment.gc4_head(1);
        assert_eq!(segment.row_count(), 4 - freed_total);
    }
}
