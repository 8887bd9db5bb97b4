// Copyright (c) 2025 OpsPulse Contributors
//
// Lock-free single-producer single-consumer ring buffer
//
// The ring is a power-of-two array of slots indexed by two monotonically
// wrapping counters: the producer owns `head`, the consumer owns `tail`,
// and one slot is kept unused to distinguish full from empty. A slot write
// happens-before the release store of `head` that publishes it, so a
// consumer that observes the new head also observes the element payload.
// The matching acquire/release pairs are the only synchronization; there
// are no locks anywhere on this path.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Pad hot atomics to their own cache line to avoid false sharing between
/// the producing and consuming cores.
#[repr(align(64))]
struct CachePadded<T>(T);

struct RingShared<T> {
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    /// Producer index; next slot to write.
    head: CachePadded<AtomicUsize>,
    /// Consumer index; next slot to read.
    tail: CachePadded<AtomicUsize>,
}

// Slots are only written by the producer before the head release store and
// only read by the consumer after the matching acquire load.
unsafe impl<T: Send> Send for RingShared<T> {}
unsafe impl<T: Send> Sync for RingShared<T> {}

/// Producing endpoint of an SPSC ring. `Send` but deliberately not `Clone`:
/// exactly one thread may push.
pub struct Producer<T> {
    shared: Arc<RingShared<T>>,
}

/// Consuming endpoint of an SPSC ring. `Send` but deliberately not `Clone`:
/// exactly one thread may pop.
pub struct Consumer<T> {
    shared: Arc<RingShared<T>>,
}

/// Create an SPSC ring holding up to `capacity` elements.
///
/// The backing array is sized to the next power of two above `capacity`
/// (index wrap uses a bitmask), with one slot reserved; a ring created with
/// `capacity` of 3 reports [`capacity`](Producer::capacity) 4 and holds 3
/// elements.
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>)> {
    if capacity == 0 {
        return Err(Error::invalid("ring capacity must be non-zero"));
    }

    let actual = capacity.next_power_of_two();
    let mut slots = Vec::with_capacity(actual);
    for _ in 0..actual {
        slots.push(UnsafeCell::new(MaybeUninit::uninit()));
    }

    let shared = Arc::new(RingShared {
        mask: actual - 1,
        slots: slots.into_boxed_slice(),
        head: CachePadded(AtomicUsize::new(0)),
        tail: CachePadded(AtomicUsize::new(0)),
    });

    Ok((
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    ))
}

impl<T> RingShared<T> {
    fn len(&self) -> usize {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        head.wrapping_sub(tail) & self.mask
    }

    fn is_empty(&self) -> bool {
        self.head.0.load(Ordering::Acquire) == self.tail.0.load(Ordering::Acquire)
    }

    fn is_full(&self) -> bool {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Acquire);
        (head + 1) & self.mask == tail
    }
}

impl<T> Producer<T> {
    /// Push an element, handing it back when the ring is full.
    pub fn push(&mut self, value: T) -> std::result::Result<(), T> {
        let shared = &self.shared;
        let head = shared.head.0.load(Ordering::Relaxed);
        let next = (head + 1) & shared.mask;

        if next == shared.tail.0.load(Ordering::Acquire) {
            return Err(value);
        }

        unsafe { (*shared.slots[head].get()).write(value) };
        shared.head.0.store(next, Ordering::Release);
        Ok(())
    }

    /// Slots in the backing array, always a power of two. One slot is
    /// reserved, so at most `capacity() - 1` elements are in flight.
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Instantaneous element count; a snapshot, racing pops may make it
    /// stale by the time the caller looks at it.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }
}

impl<T> Consumer<T> {
    /// Pop the oldest element, or `None` when the ring is empty.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &self.shared;
        let tail = shared.tail.0.load(Ordering::Relaxed);

        if tail == shared.head.0.load(Ordering::Acquire) {
            return None;
        }

        let value = unsafe { (*shared.slots[tail].get()).assume_init_read() };
        shared.tail.0.store((tail + 1) & shared.mask, Ordering::Release);
        Some(value)
    }

    /// Slots in the backing array, always a power of two.
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Instantaneous element count; a snapshot, racing pushes may make it
    /// stale by the time the caller looks at it.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.shared.is_full()
    }
}

impl<T> Drop for RingShared<T> {
    fn drop(&mut self) {
        // Both endpoints are gone; drain whatever is still initialized.
        let mut tail = *self.tail.0.get_mut();
        let head = *self.head.0.get_mut();
        while tail != head {
            unsafe { (*self.slots[tail].get()).assume_init_drop() };
            tail = (tail + 1) & self.mask;
        }
    }
}
