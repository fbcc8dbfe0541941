//! All-to-all mesh: a producers x consumers matrix of SPSC rings acting as
//! one MPMC queue.
//!
//! Row `p` is written only by producer `p`, column `c` read only by
//! consumer `c`, so every ring stays strictly single-producer and
//! single-consumer. Cursors (one per row, one per column) resume the scan
//! where the last operation succeeded, which spreads traffic round-robin.
//! Items from one producer stay FIFO per target ring; consumers interleave
//! rows freely.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::pad::{CachePadded, Padded, PaddingMode};
use crate::spsc::SpscRing;
use crate::MpmcQueue;

/// MPMC emulation over SPSC rings. Thread ids select the row (`tid % P`)
/// on push and the column (`tid % C`) on pop, so at most one thread may
/// drive each row and each column at a time.
pub struct MeshQueue<T, P: PaddingMode = Padded> {
    rings: Box<[SpscRing<T, P>]>,
    producers: usize,
    consumers: usize,
    // Each cursor is written only by the thread owning its row/column; they
    // are atomics purely to keep the struct shareable.
    prod_cursor: Box<[CachePadded<AtomicUsize>]>,
    cons_cursor: Box<[CachePadded<AtomicUsize>]>,
}

impl<T, P: PaddingMode> MeshQueue<T, P> {
    /// Builds a `producers x consumers` matrix of rings with `capacity`
    /// slots each.
    pub fn new(capacity: usize, producers: usize, consumers: usize) -> Self {
        assert!(producers > 0 && consumers > 0);

        Self {
            rings: (0..producers * consumers)
                .map(|_| SpscRing::new(capacity))
                .collect(),
            producers,
            consumers,
            prod_cursor: (0..producers)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
            cons_cursor: (0..consumers)
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
        }
    }

    #[inline]
    fn ring(&self, producer: usize, consumer: usize) -> &SpscRing<T, P> {
        &self.rings[producer * self.consumers + consumer]
    }

    pub fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        let producer = tid % self.producers;
        let start = self.prod_cursor[producer].load(Ordering::Relaxed);

        // Scan right from the cursor, then wrap from the start.
        for offset in 0..self.consumers {
            let consumer = if start + offset < self.consumers {
                start + offset
            } else {
                start + offset - self.consumers
            };
            if self.ring(producer, consumer).push(item) {
                let next = if consumer + 1 == self.consumers {
                    0
                } else {
                    consumer + 1
                };
                self.prod_cursor[producer].store(next, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        let consumer = tid % self.consumers;
        let start = self.cons_cursor[consumer].load(Ordering::Relaxed);

        for offset in 0..self.producers {
            let producer = if start + offset < self.producers {
                start + offset
            } else {
                start + offset - self.producers
            };
            if let Some(item) = self.ring(producer, consumer).pop() {
                let next = if producer + 1 == self.producers {
                    0
                } else {
                    producer + 1
                };
                self.cons_cursor[consumer].store(next, Ordering::Relaxed);
                return Some(item);
            }
        }
        None
    }

    /// Sum of the per-ring occupancy estimates.
    pub fn length(&self, _tid: usize) -> usize {
        self.rings.iter().map(|ring| ring.length()).sum()
    }

    /// Capacity of one underlying ring.
    pub fn capacity(&self) -> usize {
        self.rings[0].capacity()
    }

    pub fn producers(&self) -> usize {
        self.producers
    }

    pub fn consumers(&self) -> usize {
        self.consumers
    }

    pub fn name(_padded: bool) -> String {
        "MeshQueue".to_string()
    }
}

impl<T: Send, P: PaddingMode> MpmcQueue<T> for MeshQueue<T, P> {
    #[inline]
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        MeshQueue::push(self, item, tid)
    }

    #[inline]
    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        MeshQueue::pop(self, tid)
    }

    fn length(&self, tid: usize) -> usize {
        MeshQueue::length(self, tid)
    }

    fn capacity(&self) -> usize {
        MeshQueue::capacity(self)
    }

    fn name(padded: bool) -> String {
        MeshQueue::<T, P>::name(padded)
    }
}
