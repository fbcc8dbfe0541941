//! Ring segment driven by CAS loops on head and tail.
//!
//! No fetch-and-add: a producer reads the tail, checks the target cell's
//! sequence word, and tries to advance the tail by CAS. Winning the CAS
//! grants exclusive ownership of the cell until the sequence word is
//! published. Contention is damped with bounded busy-wait back-off.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::cell::PairCell;
use crate::pad::{Padded, PaddingMode};
use crate::remap::CacheRemap;
use crate::segment::{self, Backoff, RingSegment, SegmentHeader};
use crate::{effective_size, MpmcQueue};

/// CAS attempts at closing a full segment before forcing the closed bit.
pub const TRY_CLOSE_MTQ: u32 = 10;

/// Bounded MPMC ring advancing head/tail by CAS, one sequence word per
/// cell.
///
/// The sequence protocol: a cell at position `i` holds `seq == t` when free
/// for ticket `t`, `t + 1` once filled, and `t + N` after the matching
/// dequeue hands it to the next revolution.
#[repr(C)]
pub struct MtqRing<T, P: PaddingMode = Padded, const BOUNDED: bool = true> {
    header: SegmentHeader<Self>,
    size: usize,
    mask: usize,
    remap: CacheRemap,
    cells: Box<[PairCell<T, P>]>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, P: PaddingMode, const BOUNDED: bool> Send for MtqRing<T, P, BOUNDED> {}
unsafe impl<T: Send, P: PaddingMode, const BOUNDED: bool> Sync for MtqRing<T, P, BOUNDED> {}

impl<T, P: PaddingMode, const BOUNDED: bool> MtqRing<T, P, BOUNDED> {
    pub fn new(capacity: usize, max_threads: usize) -> Self
    where
        T: Send,
    {
        <Self as RingSegment<T>>::with_start(capacity, max_threads, 0)
    }

    #[inline(always)]
    fn pos(&self, ticket: u64) -> usize {
        let reduced = if cfg!(feature = "no-pow2") {
            (ticket % self.size as u64) as usize
        } else {
            ticket as usize & self.mask
        };
        self.remap.index(reduced)
    }

    fn push_inner(&self, item: NonNull<T>, _tid: usize) -> bool {
        let mut try_close = 0u32;
        let mut backoff = Backoff::new();

        loop {
            let tail_ticket = self.header.tail.load(Ordering::Relaxed);
            if !BOUNDED && segment::is_closed(tail_ticket) {
                return false;
            }

            let cell = &self.cells[self.pos(tail_ticket)];
            let seq = cell.idx.load(Ordering::Acquire);

            if tail_ticket == seq {
                if self
                    .header
                    .tail
                    .compare_exchange_weak(
                        tail_ticket,
                        tail_ticket + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // The CAS win makes this thread the only writer of the
                    // cell until the sequence is published.
                    cell.val.store(item.as_ptr(), Ordering::Relaxed);
                    cell.idx.store(seq + 1, Ordering::Release);
                    return true;
                }
                backoff.spin();
            } else if tail_ticket > seq {
                // Cell still carries the previous revolution: the ring is
                // full.
                if BOUNDED {
                    return false;
                }
                try_close += 1;
                if self
                    .header
                    .close(tail_ticket.wrapping_sub(1), try_close > TRY_CLOSE_MTQ)
                {
                    return false;
                }
            }
        }
    }

    fn pop_inner(&self, _tid: usize) -> Option<NonNull<T>> {
        let mut backoff = Backoff::new();

        loop {
            let head_ticket = self.header.head.load(Ordering::Relaxed);
            let cell = &self.cells[self.pos(head_ticket)];
            let seq = cell.idx.load(Ordering::Acquire);

            if seq == head_ticket + 1 {
                if self
                    .header
                    .head
                    .compare_exchange_weak(
                        head_ticket,
                        head_ticket + 1,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    let item = cell.val.load(Ordering::Relaxed);
                    cell.idx
                        .store(head_ticket + self.size as u64, Ordering::Release);
                    return NonNull::new(item);
                }
                backoff.spin();
            } else if seq < head_ticket + 1 {
                if self.header.is_empty() {
                    return None;
                }
            }
        }
    }
}

impl<T: Send, P: PaddingMode, const BOUNDED: bool> RingSegment<T> for MtqRing<T, P, BOUNDED> {
    fn with_start(capacity: usize, _max_threads: usize, start: u64) -> Self {
        let size = effective_size(capacity);
        let remap = CacheRemap::new(size, std::mem::size_of::<PairCell<T, P>>());

        let ring = Self {
            header: SegmentHeader::new(start),
            size,
            mask: size.wrapping_sub(1),
            remap,
            cells: (0..size).map(|_| PairCell::new()).collect(),
            _marker: PhantomData,
        };

        for i in start..start + size as u64 {
            ring.cells[ring.pos(i)].init(i);
        }
        ring
    }

    #[inline]
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        self.push_inner(item, tid)
    }

    #[inline]
    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        self.pop_inner(tid)
    }

    #[inline]
    fn header(&self) -> &SegmentHeader<Self> {
        &self.header
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.size
    }

    fn name(padded: bool) -> String {
        let bounded = if BOUNDED { "Bounded" } else { "" };
        let pad = if P::PADDED && padded { "/padded" } else { "" };
        format!("{}MtqRing{}", bounded, pad)
    }
}

impl<T: Send, P: PaddingMode, const BOUNDED: bool> MpmcQueue<T> for MtqRing<T, P, BOUNDED> {
    #[inline]
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        self.push_inner(item, tid)
    }

    #[inline]
    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        self.pop_inner(tid)
    }

    fn length(&self, _tid: usize) -> usize {
        self.header.length()
    }

    fn capacity(&self) -> usize {
        self.size
    }

    fn name(padded: bool) -> String {
        <Self as RingSegment<T>>::name(padded)
    }
}
