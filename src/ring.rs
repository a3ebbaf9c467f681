//! Lock-free single-producer/single-consumer ring.
//!
//! Fixed capacity (power of two), index arithmetic by mask. One slot is
//! sacrificed so that `head == tail` means empty and `(head + 1) & mask ==
//! tail` means full, without a separate occupancy counter: a ring of
//! capacity `C` holds at most `C - 1` items.
//!
//! The producer writes the slot, then publishes the new head with a release
//! store; the consumer loads head with acquire before reading the slot, so
//! the payload write is visible before the index update is observed.
//! Symmetric acquire/release applies to tail. No locks, no allocation after
//! construction; `push` and `pop` never block and are safe in a tight retry
//! loop.
//!
//! The SPSC discipline is enforced by construction: [`spsc`] returns split
//! [`Producer`]/[`Consumer`] halves, each held by exactly one thread for the
//! ring's lifetime.

use crate::core::EngineError;
use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared<T> {
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next write index. Stored by the producer, loaded by the consumer.
    head: CachePadded<AtomicUsize>,
    /// Next read index. Stored by the consumer, loaded by the producer.
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: slots are only ever accessed by the single producer (writes into
// free slots) and the single consumer (reads out of occupied slots); the
// acquire/release index handoff orders those accesses.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Both halves are gone, so plain loads are fine here.
        let head = *self.head.get_mut();
        let mut tail = *self.tail.get_mut();
        while tail != head {
            unsafe { (*self.buffer[tail].get()).assume_init_drop() };
            tail = (tail + 1) & self.mask;
        }
    }
}

/// Producing half of a ring. Exactly one thread may hold it.
pub struct Producer<T> {
    ring: Arc<Shared<T>>,
}

/// Consuming half of a ring. Exactly one thread may hold it.
pub struct Consumer<T> {
    ring: Arc<Shared<T>>,
}

/// Create a ring of `capacity` slots (`capacity - 1` usable).
///
/// `capacity` must be a power of two and at least 2; anything else is a
/// configuration error surfaced before the pipeline starts.
pub fn spsc<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), EngineError> {
    if capacity < 2 || !capacity.is_power_of_two() {
        return Err(EngineError::InvalidCapacity(capacity));
    }

    let buffer = (0..capacity)
        .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
        .collect();

    let ring = Arc::new(Shared {
        buffer,
        mask: capacity - 1,
        head: CachePadded::new(AtomicUsize::new(0)),
        tail: CachePadded::new(AtomicUsize::new(0)),
    });

    Ok((Producer { ring: Arc::clone(&ring) }, Consumer { ring }))
}

impl<T> Producer<T> {
    /// Attempt to enqueue `item`.
    ///
    /// On a full ring the item is handed back untouched and the caller owns
    /// the drop accounting.
    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let r = &*self.ring;
        let head = r.head.load(Ordering::Relaxed);
        let next = (head + 1) & r.mask;
        if next == r.tail.load(Ordering::Acquire) {
            return Err(item);
        }
        unsafe { (*r.buffer[head].get()).write(item) };
        r.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Total slot count (usable slots are one fewer).
    pub fn capacity(&self) -> usize {
        self.ring.mask + 1
    }
}

impl<T> Consumer<T> {
    /// Dequeue the oldest item, or `None` when the ring is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let r = &*self.ring;
        let tail = r.tail.load(Ordering::Relaxed);
        if tail == r.head.load(Ordering::Acquire) {
            return None;
        }
        let item = unsafe { (*r.buffer[tail].get()).assume_init_read() };
        r.tail.store((tail + 1) & r.mask, Ordering::Release);
        Some(item)
    }

    /// Total slot count (usable slots are one fewer).
    pub fn capacity(&self) -> usize {
        self.ring.mask + 1
    }
}
