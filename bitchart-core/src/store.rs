//! The shared bar store: one memory region jointly mapped by the UI thread,
//! the render worker, and the compute worker.
//!
//! Layout (binary-compatible with the documented wire format):
//! - header: four little-endian i32 at bytes 0..16
//!   `count`, `head`, `last_update_low`, `last_update_high`
//! - payload: `capacity * 6` f32 at bytes 16.., bar fields in order
//!   `time, open, high, low, close, volume` (24 bytes per bar)
//!
//! # Memory ordering protocol
//!
//! Single writer (the controller), any number of readers (the workers).
//!
//! **Writer:**
//! 1. Write bar floats into the payload (plain stores, protected by protocol)
//! 2. Store `head` with Release
//! 3. Store `count` with Release, which publishes the payload
//! 4. Store the split update timestamp (low, then high)
//!
//! **Reader:**
//! 1. Load `count` with Acquire, synchronizing with the writer's step 3
//! 2. Load `head` with Acquire
//! 3. Read payload floats for logical indices `< count`
//!
//! A reader that acquires `count = N` therefore observes fully written bars
//! for all N logical slots. In ring mode a concurrent append can overwrite
//! the oldest slots and advance `head` while a slow reader copies, so bulk
//! reads capture one `(count, head)` pair up front, copy against it, then
//! re-check the header and retry the copy when the writer moved it. Every
//! ring overwrite advances `head`, so a copy that passes the re-check never
//! splices two generations together.

use crate::bar::{Bar, FLOATS_PER_BAR};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Initial capacity when none is requested, in bars.
pub const DEFAULT_CAPACITY: usize = 1 << 16;
/// Absolute growth cap, in bars (~2M bars, 48 MiB of payload).
pub const MAX_CAPACITY: usize = 1 << 21;

/// Copy retries before a bulk read gives up on a quiescent header and
/// serves its last attempt. Exhausting this needs the writer to wrap the
/// ring during every single copy, which a real feed never sustains.
const MAX_READ_RETRIES: usize = 64;

/// Buffer behavior when an append exceeds the current capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreMode {
    /// Capacity doubles (next power of two) up to [`MAX_CAPACITY`]; an
    /// append that still does not fit is dropped and reported via `false`.
    Growable,
    /// Writes wrap; the oldest bars are overwritten.
    Ring,
}

#[repr(C)]
struct Header {
    count: AtomicI32,
    head: AtomicI32,
    last_update_low: AtomicI32,
    last_update_high: AtomicI32,
}

/// One fixed-capacity mapping of the store.
///
/// Workers hold `Arc<StoreRegion>` views and only ever read. Growing the
/// store allocates a fresh region; old handles stay valid (and readable)
/// until their holder receives the replacement.
pub struct StoreRegion {
    header: Header,
    payload: UnsafeCell<Box<[f32]>>,
    capacity: usize,
}

// SAFETY: the payload is only mutated by the single `SharedStore` owner,
// and every mutation is published by a Release store of `count`/`head`
// that readers Acquire before touching the payload (protocol above).
unsafe impl Sync for StoreRegion {}
unsafe impl Send for StoreRegion {}

/// Read-only view suitable for handing to a worker.
pub type StoreHandle = Arc<StoreRegion>;

impl StoreRegion {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            header: Header {
                count: AtomicI32::new(0),
                head: AtomicI32::new(0),
                last_update_low: AtomicI32::new(0),
                last_update_high: AtomicI32::new(0),
            },
            payload: UnsafeCell::new(vec![0.0; capacity * FLOATS_PER_BAR].into_boxed_slice()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid bars. Acquire: pairs with the writer's publish.
    pub fn count(&self) -> usize {
        self.header.count.load(Ordering::Acquire).max(0) as usize
    }

    /// Ring-buffer head (index of the oldest logical bar).
    pub fn head(&self) -> usize {
        self.header.head.load(Ordering::Acquire).max(0) as usize
    }

    /// Millisecond timestamp of the last mutation.
    ///
    /// The 64-bit value is split over two i32 header slots for layout
    /// compatibility; the reader re-reads until the high half is stable
    /// around the low load.
    pub fn last_update_ms(&self) -> u64 {
        loop {
            let high1 = self.header.last_update_high.load(Ordering::Acquire);
            let low = self.header.last_update_low.load(Ordering::Acquire);
            let high2 = self.header.last_update_high.load(Ordering::Acquire);
            if high1 == high2 {
                return ((high1 as u32 as u64) << 32) | low as u32 as u64;
            }
        }
    }

    /// Read the bar at logical index `i` (0 = oldest).
    ///
    /// Callers must have observed `i < count()`.
    pub fn bar_at(&self, i: usize) -> Bar {
        self.bar_at_with(self.head(), i)
    }

    // Logical read against a caller-captured head, so a multi-bar copy
    // resolves every index through the same ring origin.
    fn bar_at_with(&self, head: usize, i: usize) -> Bar {
        let physical = (head + i) % self.capacity;
        let mut floats = [0.0f32; FLOATS_PER_BAR];
        // SAFETY: physical < capacity, and the slot was published by the
        // Release/Acquire protocol before the caller observed its index.
        unsafe {
            let base = (*self.payload.get()).as_ptr().add(physical * FLOATS_PER_BAR);
            std::ptr::copy_nonoverlapping(base, floats.as_mut_ptr(), FLOATS_PER_BAR);
        }
        Bar::from_floats(floats)
    }

    /// Copy `count` bars starting at logical `offset`, clamped to the
    /// published count.
    ///
    /// One `(count, head)` pair governs the whole copy; if the writer
    /// moved either while we read (a ring overwrite), the copy is retried
    /// against the fresh pair.
    pub fn read_bars(&self, offset: usize, count: usize) -> Vec<Bar> {
        let mut attempt = 0;
        loop {
            let published = self.count();
            let head = self.head();
            if offset >= published {
                return Vec::new();
            }
            let end = (offset + count).min(published);
            let bars: Vec<Bar> = (offset..end).map(|i| self.bar_at_with(head, i)).collect();
            if (self.count(), self.head()) == (published, head) || attempt >= MAX_READ_RETRIES {
                return bars;
            }
            attempt += 1;
            std::hint::spin_loop();
        }
    }

    /// Logical-order copy of all published bars.
    pub fn snapshot(&self) -> Vec<Bar> {
        let count = self.count();
        self.read_bars(0, count)
    }

    fn write_bar_physical(&self, physical: usize, bar: &Bar) {
        debug_assert!(physical < self.capacity);
        let floats = bar.to_floats();
        // SAFETY: single-writer discipline; readers only touch this slot
        // after the subsequent Release store of `count` makes it logical.
        unsafe {
            let base = (*self.payload.get())
                .as_mut_ptr()
                .add(physical * FLOATS_PER_BAR);
            std::ptr::copy_nonoverlapping(floats.as_ptr(), base, FLOATS_PER_BAR);
        }
    }

    fn publish(&self, head: usize, count: usize) {
        self.header.head.store(head as i32, Ordering::Release);
        self.header.count.store(count as i32, Ordering::Release);
    }

    fn stamp(&self, ms: u64) {
        self.header
            .last_update_low
            .store(ms as u32 as i32, Ordering::Release);
        self.header
            .last_update_high
            .store((ms >> 32) as u32 as i32, Ordering::Release);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The owning side of the store. Lives on the UI thread for the lifetime of
/// the chart controller; workers hold [`StoreHandle`] views.
pub struct SharedStore {
    region: StoreHandle,
    mode: StoreMode,
    max_capacity: usize,
    shared: bool,
    generation: u64,
}

impl SharedStore {
    pub fn new(mode: StoreMode) -> Self {
        Self::with_capacity(mode, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(mode: StoreMode, capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().min(MAX_CAPACITY).max(1);
        Self {
            region: Arc::new(StoreRegion::with_capacity(capacity)),
            mode,
            max_capacity: MAX_CAPACITY,
            shared: true,
            generation: 0,
        }
    }

    /// A store whose handle cannot be shared: `shared_handle()` returns
    /// `None` and callers ship owned snapshots to workers instead. The rest
    /// of the contract is unchanged.
    pub fn private(mode: StoreMode, capacity: usize) -> Self {
        let mut store = Self::with_capacity(mode, capacity);
        store.shared = false;
        store
    }

    #[cfg(test)]
    fn with_limits(mode: StoreMode, capacity: usize, max_capacity: usize) -> Self {
        let mut store = Self::with_capacity(mode, capacity);
        store.max_capacity = max_capacity;
        store
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    pub fn count(&self) -> usize {
        self.region.count()
    }

    pub fn head(&self) -> usize {
        self.region.head()
    }

    /// Bumped whenever growth swaps in a new region; callers watch this to
    /// know when worker handles must be re-distributed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A reference suitable for passing to a worker, or `None` when the
    /// store was built in private (copy) mode.
    pub fn shared_handle(&self) -> Option<StoreHandle> {
        self.shared.then(|| Arc::clone(&self.region))
    }

    /// Atomic replacement: dense payload from offset 0, `head = 0`.
    /// Capacity grows to the next power of two that fits; returns `false`
    /// (without mutating) when even the cap cannot hold the data.
    pub fn set_all(&mut self, bars: &[Bar]) -> bool {
        if bars.len() > self.region.capacity() && !self.grow_for(bars.len()) {
            return false;
        }
        for (i, bar) in bars.iter().enumerate() {
            self.region.write_bar_physical(i, bar);
        }
        self.region.publish(0, bars.len());
        self.region.stamp(now_ms());
        true
    }

    /// Append after the current logical end.
    ///
    /// Growable mode grows as needed and drops the whole batch (returning
    /// `false`) when the cap is hit. Ring mode wraps, overwriting the
    /// oldest bars and advancing `head` strictly modulo capacity.
    pub fn append(&mut self, bars: &[Bar]) -> bool {
        if bars.is_empty() {
            return true;
        }
        let count = self.region.count();
        match self.mode {
            StoreMode::Growable => {
                let needed = count + bars.len();
                if needed > self.region.capacity() && !self.grow_for(needed) {
                    log::warn!(
                        "append of {} bars dropped: store at capacity cap {}",
                        bars.len(),
                        self.max_capacity
                    );
                    return false;
                }
                for (i, bar) in bars.iter().enumerate() {
                    self.region.write_bar_physical(count + i, bar);
                }
                self.region.publish(0, needed);
            }
            StoreMode::Ring => {
                let capacity = self.region.capacity();
                let head = self.region.head();
                // Oversized batches reduce to their trailing window.
                let bars = if bars.len() > capacity {
                    &bars[bars.len() - capacity..]
                } else {
                    bars
                };
                let tail = (head + count) % capacity;
                for (i, bar) in bars.iter().enumerate() {
                    self.region.write_bar_physical((tail + i) % capacity, bar);
                }
                let overflow = (count + bars.len()).saturating_sub(capacity);
                let new_head = (head + overflow) % capacity;
                let new_count = (count + bars.len()).min(capacity);
                self.region.publish(new_head, new_count);
            }
        }
        self.region.stamp(now_ms());
        true
    }

    /// Overwrite the last logical bar in place; `count` and `head` are
    /// preserved. Returns `false` on an empty store.
    pub fn update_last(&mut self, bar: &Bar) -> bool {
        let count = self.region.count();
        if count == 0 {
            return false;
        }
        let physical = (self.region.head() + count - 1) % self.region.capacity();
        self.region.write_bar_physical(physical, bar);
        self.region.stamp(now_ms());
        true
    }

    pub fn clear(&mut self) {
        self.region.publish(0, 0);
        self.region.stamp(now_ms());
    }

    pub fn snapshot(&self) -> Vec<Bar> {
        self.region.snapshot()
    }

    /// The bar at logical index `i`, if published.
    pub fn get(&self, i: usize) -> Option<Bar> {
        (i < self.region.count()).then(|| self.region.bar_at(i))
    }

    /// Allocate a larger region and migrate the logical contents densely
    /// (`head = 0`). Old handles keep reading the old region until their
    /// holders are handed the new one.
    fn grow_for(&mut self, needed: usize) -> bool {
        let new_capacity = needed.next_power_of_two();
        if new_capacity > self.max_capacity {
            return false;
        }
        let bars = self.region.snapshot();
        let fresh = StoreRegion::with_capacity(new_capacity);
        for (i, bar) in bars.iter().enumerate() {
            fresh.write_bar_physical(i, bar);
        }
        fresh.publish(0, bars.len());
        fresh.stamp(self.region.last_update_ms());
        self.region = Arc::new(fresh);
        self.generation += 1;
        log::debug!("store grown to {} bars", new_capacity);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(time: f32, close: f32) -> Bar {
        Bar::new(time, close - 1.0, close + 1.0, close - 2.0, close, 1.0)
    }

    #[test]
    fn round_trip_set_all() {
        let mut store = SharedStore::with_capacity(StoreMode::Growable, 8);
        let bars = [
            Bar::new(1.0, 10.0, 12.0, 9.0, 11.0, 5.0),
            Bar::new(2.0, 11.0, 14.0, 10.0, 13.0, 7.0),
            Bar::new(3.0, 13.0, 15.0, 12.0, 14.0, 6.0),
        ];
        assert!(store.set_all(&bars));
        assert_eq!(store.snapshot(), bars);
        assert_eq!(store.count(), 3);
        assert_eq!(store.head(), 0);
    }

    #[test]
    fn ring_overwrite_advances_head() {
        let mut store = SharedStore::with_capacity(StoreMode::Ring, 3);
        let (a, b, c, d) = (bar(1.0, 10.0), bar(2.0, 11.0), bar(3.0, 12.0), bar(4.0, 13.0));
        assert!(store.set_all(&[a, b, c]));
        assert!(store.append(&[d]));
        assert_eq!(store.snapshot(), vec![b, c, d]);
        assert_eq!(store.count(), 3);
        assert_eq!(store.head(), 1);
    }

    #[test]
    fn ring_append_below_capacity_does_not_wrap() {
        let mut store = SharedStore::with_capacity(StoreMode::Ring, 4);
        let (a, b, c) = (bar(1.0, 10.0), bar(2.0, 11.0), bar(3.0, 12.0));
        assert!(store.set_all(&[a, b]));
        assert!(store.append(&[c]));
        assert_eq!(store.snapshot(), vec![a, b, c]);
        assert_eq!(store.head(), 0);
    }

    #[test]
    fn ring_batch_larger_than_capacity_keeps_tail() {
        let mut store = SharedStore::with_capacity(StoreMode::Ring, 2);
        let bars: Vec<Bar> = (0..5).map(|i| bar(i as f32, 10.0 + i as f32)).collect();
        assert!(store.append(&bars));
        assert_eq!(store.snapshot(), vec![bars[3], bars[4]]);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn growable_append_grows_and_bumps_generation() {
        let mut store = SharedStore::with_capacity(StoreMode::Growable, 2);
        let bars: Vec<Bar> = (0..5).map(|i| bar(i as f32, 10.0)).collect();
        assert_eq!(store.generation(), 0);
        assert!(store.append(&bars));
        assert_eq!(store.count(), 5);
        assert!(store.capacity() >= 5);
        assert_eq!(store.generation(), 1);
        assert_eq!(store.snapshot(), bars);
    }

    #[test]
    fn growable_append_past_cap_is_dropped() {
        let mut store = SharedStore::with_limits(StoreMode::Growable, 2, 4);
        let bars: Vec<Bar> = (0..4).map(|i| bar(i as f32, 10.0)).collect();
        assert!(store.set_all(&bars));
        assert!(!store.append(&[bar(9.0, 10.0)]));
        // dropped append leaves the store untouched
        assert_eq!(store.count(), 4);
        assert_eq!(store.snapshot(), bars);
    }

    #[test]
    fn update_last_preserves_count_and_head() {
        let mut store = SharedStore::with_capacity(StoreMode::Ring, 3);
        let (a, b, c, d) = (bar(1.0, 10.0), bar(2.0, 11.0), bar(3.0, 12.0), bar(4.0, 13.0));
        store.set_all(&[a, b, c]);
        store.append(&[d]);
        let patched = bar(4.0, 99.0);
        assert!(store.update_last(&patched));
        assert_eq!(store.snapshot(), vec![b, c, patched]);
        assert_eq!(store.head(), 1);

        let mut empty = SharedStore::with_capacity(StoreMode::Growable, 2);
        assert!(!empty.update_last(&patched));
    }

    #[test]
    fn clear_resets_header() {
        let mut store = SharedStore::with_capacity(StoreMode::Growable, 4);
        store.set_all(&[bar(1.0, 10.0)]);
        store.clear();
        assert_eq!(store.count(), 0);
        assert_eq!(store.head(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn private_store_has_no_handle() {
        let store = SharedStore::private(StoreMode::Growable, 4);
        assert!(store.shared_handle().is_none());
        let shared = SharedStore::with_capacity(StoreMode::Growable, 4);
        assert!(shared.shared_handle().is_some());
    }

    #[test]
    fn update_timestamp_round_trips_64_bits() {
        let region = StoreRegion::with_capacity(1);
        let ms = 0x1_2345_6789u64;
        region.stamp(ms);
        assert_eq!(region.last_update_ms(), ms);
    }

    // A reader that acquires `count = N` can safely read exactly the
    // first N logical bars. Every field encodes the write index, so a
    // torn read (fields mixed from two writes) or a copy spliced across a
    // ring wrap (head moved mid-read) cannot reproduce a consistent,
    // gap-free window.
    #[test]
    fn concurrent_reader_sees_consistent_windows() {
        fn indexed_bar(i: u32) -> Bar {
            let t = i as f32;
            Bar::new(t, t + 0.25, t + 1.25, t - 0.25, t + 0.75, t)
        }

        let mut store = SharedStore::with_capacity(StoreMode::Ring, 64);
        let handle = store.shared_handle().unwrap();
        let reader = std::thread::spawn(move || {
            for _ in 0..2000 {
                let bars = handle.snapshot();
                for b in &bars {
                    // fields from one write, or the read was torn
                    assert_eq!(b.open, b.time + 0.25, "torn bar: {b:?}");
                    assert_eq!(b.high, b.time + 1.25, "torn bar: {b:?}");
                    assert_eq!(b.low, b.time - 0.25, "torn bar: {b:?}");
                    assert_eq!(b.close, b.time + 0.75, "torn bar: {b:?}");
                    assert_eq!(b.volume, b.time, "torn bar: {b:?}");
                }
                // one logical window, strictly monotonic with no gaps
                for pair in bars.windows(2) {
                    assert_eq!(
                        pair[1].time - pair[0].time,
                        1.0,
                        "spliced window: {} then {}",
                        pair[0].time,
                        pair[1].time
                    );
                }
            }
        });
        for i in 1..4000u32 {
            store.append(&[indexed_bar(i)]);
        }
        reader.join().unwrap();

        let settled = store.snapshot();
        assert_eq!(settled.len(), 64);
        assert_eq!(settled[0].time, (4000 - 64) as f32);
        assert_eq!(settled[63].time, 3999.0);
    }
}
