//! Ring segment with double-word cell transitions.
//!
//! Tickets come from fetch-and-add on head/tail; each cell's (value, epoch)
//! pair changes in a single 128-bit CAS, so a producer and a consumer
//! racing on the same cell are serialised by hardware. A consumer that
//! overtakes a slow producer moves the cell one revolution forward, marking
//! it unsafe so the producer's stale ticket can never land.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::cell::{self, pack, unpack, WideCell};
use crate::pad::{Padded, PaddingMode};
use crate::remap::CacheRemap;
use crate::segment::{self, RingSegment, SegmentHeader};
use crate::{effective_size, MpmcQueue};

/// CAS attempts at closing a full segment before forcing the closed bit.
pub const TRY_CLOSE_CRQ: u32 = 10;

// Consumer spin budget on an empty cell before advancing its epoch.
const EMPTY_SPIN_LIMIT: u32 = 4 * 1024;
// Tail snapshot refresh interval inside the spin.
const TAIL_REFRESH: u32 = 256;

/// Bounded MPMC ring using a 128-bit CAS per cell transition.
///
/// With `BOUNDED = true` the segment never closes: a full ring reports
/// failure and becomes usable again once consumers drain it. The linked
/// adapters instantiate `BOUNDED = false` so an exhausted segment closes
/// and a successor can be chained.
#[repr(C)]
pub struct CrqRing<T, P: PaddingMode = Padded, const BOUNDED: bool = true> {
    header: SegmentHeader<Self>,
    size: usize,
    mask: usize,
    remap: CacheRemap,
    cells: Box<[WideCell<T, P>]>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, P: PaddingMode, const BOUNDED: bool> Send for CrqRing<T, P, BOUNDED> {}
unsafe impl<T: Send, P: PaddingMode, const BOUNDED: bool> Sync for CrqRing<T, P, BOUNDED> {}

impl<T, P: PaddingMode, const BOUNDED: bool> CrqRing<T, P, BOUNDED> {
    /// Creates a ring with at least `capacity` cells (rounded up to a power
    /// of two unless disabled).
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

        loop {
            let tail_ticket = self.header.tail.fetch_add(1, Ordering::Relaxed);
            if segment::is_closed(tail_ticket) {
                return false;
            }

            let cell = &self.cells[self.pos(tail_ticket)];
            let pair = cell.pair.load(Ordering::Acquire);
            let (val, word) = unpack::<T>(pair);

            if val.is_null()
                && cell::epoch(word) <= tail_ticket
                && (!cell::is_unsafe(word)
                    || self.header.head.load(Ordering::Acquire) <= tail_ticket)
            {
                let desired = pack(item.as_ptr(), tail_ticket);
                if cell
                    .pair
                    .compare_exchange(pair, desired, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return true;
                }
            }

            if tail_ticket >= self.header.head.load(Ordering::Acquire) + self.size as u64 {
                if BOUNDED {
                    return false;
                }
                try_close += 1;
                if self.header.close(tail_ticket, try_close > TRY_CLOSE_CRQ) {
                    return false;
                }
            }
        }
    }

    fn pop_inner(&self, _tid: usize) -> Option<NonNull<T>> {
        if cfg!(feature = "cautious-dequeue") && self.header.is_empty() {
            return None;
        }

        loop {
            let head_ticket = self.header.head.fetch_add(1, Ordering::Relaxed);
            let cell = &self.cells[self.pos(head_ticket)];

            let mut spins = 0u32;
            let mut tail_snapshot = 0u64;

            loop {
                let pair = cell.pair.load(Ordering::Acquire);
                let (val, word) = unpack::<T>(pair);
                let idx = cell::epoch(word);
                let unsafe_flag = word & cell::UNSAFE_BIT;

                if idx > head_ticket {
                    break;
                }

                if !val.is_null() {
                    if idx == head_ticket {
                        // Dequeue transition: empty the cell and move it to
                        // the next revolution.
                        let desired = pack(
                            std::ptr::null_mut::<T>(),
                            unsafe_flag | (head_ticket + self.size as u64),
                        );
                        if cell
                            .pair
                            .compare_exchange(pair, desired, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            return NonNull::new(val);
                        }
                    } else {
                        // Value from an older epoch: flag the cell so its
                        // producer consults head before reuse.
                        let desired = pack(val, cell::set_unsafe(idx));
                        if cell
                            .pair
                            .compare_exchange(pair, desired, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            break;
                        }
                    }
                } else {
                    if spins & (TAIL_REFRESH - 1) == 0 {
                        tail_snapshot = self.header.tail.load(Ordering::Acquire);
                    }
                    let closed = segment::is_closed(tail_snapshot);
                    let t = segment::tail_index(tail_snapshot);

                    if unsafe_flag != 0
                        || t < head_ticket + 1
                        || closed
                        || spins > EMPTY_SPIN_LIMIT
                    {
                        // Advance the empty cell past this ticket so a late
                        // producer cannot fill a position nobody will drain.
                        let desired =
                            pack(val, unsafe_flag | (head_ticket + self.size as u64));
                        if cell
                            .pair
                            .compare_exchange(pair, desired, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            break;
                        }
                    }
                    spins += 1;
                }
            }

            if segment::tail_index(self.header.tail.load(Ordering::Acquire)) <= head_ticket + 1 {
                self.header.fix_state();
                return None;
            }
        }
    }
}

impl<T: Send, P: PaddingMode, const BOUNDED: bool> RingSegment<T> for CrqRing<T, P, BOUNDED> {
    fn with_start(capacity: usize, _max_threads: usize, start: u64) -> Self {
        let size = effective_size(capacity);
        let remap = CacheRemap::new(size, std::mem::size_of::<WideCell<T, P>>());

        let ring = Self {
            header: SegmentHeader::new(start),
            size,
            mask: size.wrapping_sub(1),
            remap,
            cells: (0..size).map(|_| WideCell::new()).collect(),
            _marker: PhantomData,
        };

        // Seed each cell with the epoch of its first ticket.
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
        format!("{}CrqRing{}", bounded, pad)
    }
}

impl<T: Send, P: PaddingMode, const BOUNDED: bool> MpmcQueue<T> for CrqRing<T, P, BOUNDED> {
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
