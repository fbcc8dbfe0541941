//! Shared state and behaviour of all ring segments.
//!
//! A segment is one bounded ring. Its `tail` word keeps the closed flag in
//! the MSB and the tail index in the low 63 bits; `head` is a plain index.
//! `next` chains segments when an adapter grows the queue.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::pad::CachePadded;

/// MSB of the tail word: no further push may succeed on this segment.
pub const CLOSED_BIT: u64 = 1 << 63;

#[inline(always)]
pub fn tail_index(tail: u64) -> u64 {
    tail & !CLOSED_BIT
}

#[inline(always)]
pub fn is_closed(tail: u64) -> bool {
    tail & CLOSED_BIT != 0
}

/// Head/tail/next triple embedded at the front of every segment type.
pub struct SegmentHeader<S> {
    pub(crate) head: CachePadded<AtomicU64>,
    pub(crate) tail: CachePadded<AtomicU64>,
    pub(crate) next: CachePadded<AtomicPtr<S>>,
}

impl<S> SegmentHeader<S> {
    /// A fresh segment starts with head == tail == `start`. Adapters pass
    /// the predecessor's tail so one logical index space spans the chain.
    pub(crate) fn new(start: u64) -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(start)),
            tail: CachePadded::new(AtomicU64::new(start)),
            next: CachePadded::new(AtomicPtr::new(std::ptr::null_mut())),
        }
    }

    #[inline]
    pub(crate) fn head_index(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn tail_index(&self) -> u64 {
        tail_index(self.tail.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        is_closed(self.tail.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head_index() >= self.tail_index()
    }

    /// Ticket-based operations can leave head above tail (consumers keep
    /// fetch-adding on an empty ring). Lift tail back up to head.
    pub(crate) fn fix_state(&self) {
        loop {
            let t = self.tail.load(Ordering::Acquire);
            let h = self.head.load(Ordering::Acquire);
            if self.tail.load(Ordering::Acquire) != t {
                continue;
            }
            if h > t {
                if self
                    .tail
                    .compare_exchange(t, h, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
                continue;
            }
            break;
        }
    }

    /// Sets the closed bit. The CAS form expects the tail to still be
    /// `tail_ticket + 1` (the value our own fetch-add produced) and fails
    /// under contention; `force` flips the bit unconditionally.
    pub(crate) fn close(&self, tail_ticket: u64, force: bool) -> bool {
        if force {
            self.tail.fetch_or(CLOSED_BIT, Ordering::AcqRel);
            return true;
        }
        let expected = tail_ticket + 1;
        self.tail
            .compare_exchange(
                expected,
                expected | CLOSED_BIT,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Advisory element count; tickets in flight make this approximate.
    pub(crate) fn length(&self) -> usize {
        let t = self.tail_index();
        let h = self.head_index();
        t.saturating_sub(h) as usize
    }
}

/// A bounded MPMC ring usable as the building block of the linked adapters.
///
/// Implementations provide the cell protocol; the header carries everything
/// the adapters need to chain, close and retire segments.
pub trait RingSegment<T>: Send + Sync + Sized {
    /// Creates a segment whose index space begins at `start`.
    fn with_start(capacity: usize, max_threads: usize, start: u64) -> Self;

    /// Attempts to insert. `false` means the segment is full (bounded use)
    /// or closed (linked use).
    fn push(&self, item: NonNull<T>, tid: usize) -> bool;

    /// Removes the next item, or `None` when the segment is empty.
    fn pop(&self, tid: usize) -> Option<NonNull<T>>;

    fn header(&self) -> &SegmentHeader<Self>;

    /// Effective ring size after any power-of-two rounding.
    fn capacity(&self) -> usize;

    fn name(padded: bool) -> String;

    #[inline]
    fn head_index(&self) -> u64 {
        self.header().head_index()
    }

    #[inline]
    fn tail_index(&self) -> u64 {
        self.header().tail_index()
    }

    /// Start index for the successor segment. The last ticket of this
    /// segment was `tail - 1`, so the successor begins there.
    #[inline]
    fn next_start_index(&self) -> u64 {
        self.tail_index().saturating_sub(1)
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.header().is_closed()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.header().is_empty()
    }

    #[inline]
    fn length(&self, _tid: usize) -> usize {
        self.header().length()
    }
}

/// Busy-wait back-off between CAS retries, doubling from `MIN_BACKOFF` to
/// `MAX_BACKOFF` pause cycles. No yields, no sleeps.
pub const MIN_BACKOFF: u32 = 128;
pub const MAX_BACKOFF: u32 = 1024;

pub(crate) struct Backoff {
    cur: u32,
}

impl Backoff {
    #[inline]
    pub(crate) fn new() -> Self {
        Self { cur: MIN_BACKOFF }
    }

    #[inline]
    pub(crate) fn spin(&mut self) {
        for _ in 0..self.cur {
            std::hint::spin_loop();
        }
        self.cur = (self.cur * 2).min(MAX_BACKOFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_bit_round_trip() {
        assert!(!is_closed(42));
        assert_eq!(tail_index(42 | CLOSED_BIT), 42);
        assert!(is_closed(42 | CLOSED_BIT));
    }

    #[test]
    fn fix_state_lifts_tail() {
        let header: SegmentHeader<()> = SegmentHeader::new(0);
        header.head.store(10, Ordering::Relaxed);
        header.tail.store(4, Ordering::Relaxed);
        header.fix_state();
        assert_eq!(header.tail.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn close_cas_needs_matching_ticket() {
        let header: SegmentHeader<()> = SegmentHeader::new(0);
        header.tail.store(8, Ordering::Relaxed);
        assert!(!header.close(3, false));
        assert!(header.close(7, false));
        assert!(header.is_closed());
        assert_eq!(header.tail_index(), 8);
    }

    #[test]
    fn forced_close_always_wins() {
        let header: SegmentHeader<()> = SegmentHeader::new(0);
        header.tail.store(123, Ordering::Relaxed);
        assert!(header.close(0, true));
        assert!(header.is_closed());
        assert_eq!(header.tail_index(), 123);
    }
}
