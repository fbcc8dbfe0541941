//! Ring segment using only single-word CAS.
//!
//! Where the double-word variant moves a cell's (value, epoch) pair
//! atomically, this ring splits the transition into three single-word
//! steps, guarded by a per-thread reserved marker: a producer first parks
//! its marker in the value slot, then advances the epoch, then swaps the
//! marker for the payload. Markers have the pointer LSB set, so they can
//! never collide with a payload address (payloads must be at least
//! 2-aligned).

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::cell::{self, PairCell};
use crate::pad::{Padded, PaddingMode};
use crate::remap::CacheRemap;
use crate::segment::{self, RingSegment, SegmentHeader};
use crate::{effective_size, MpmcQueue};

/// CAS attempts at closing a full segment before forcing the closed bit.
pub const TRY_CLOSE_PRQ: u32 = 10;

const EMPTY_SPIN_LIMIT: u32 = 4 * 1024;
const TAIL_REFRESH: u32 = 256;

#[inline(always)]
fn reserved_marker<T>(tid: usize) -> *mut T {
    ((tid << 1) | 1) as *mut T
}

#[inline(always)]
fn is_marker<T>(ptr: *mut T) -> bool {
    ptr as usize & 1 != 0
}

/// Bounded MPMC ring built from single-word CAS and reserved markers.
///
/// Thread ids must be unique among concurrent callers; the ring derives
/// each thread's marker from its id.
#[repr(C)]
pub struct PrqRing<T, P: PaddingMode = Padded, const BOUNDED: bool = true> {
    header: SegmentHeader<Self>,
    size: usize,
    mask: usize,
    remap: CacheRemap,
    cells: Box<[PairCell<T, P>]>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, P: PaddingMode, const BOUNDED: bool> Send for PrqRing<T, P, BOUNDED> {}
unsafe impl<T: Send, P: PaddingMode, const BOUNDED: bool> Sync for PrqRing<T, P, BOUNDED> {}

impl<T, P: PaddingMode, const BOUNDED: bool> PrqRing<T, P, BOUNDED> {
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

    fn push_inner(&self, item: NonNull<T>, tid: usize) -> bool {
        let mut try_close = 0u32;

        loop {
            let tail_ticket = self.header.tail.fetch_add(1, Ordering::Relaxed);
            if segment::is_closed(tail_ticket) {
                return false;
            }

            let cell = &self.cells[self.pos(tail_ticket)];
            let idx = cell.idx.load(Ordering::Acquire);
            let val = cell.val.load(Ordering::Acquire);

            if val.is_null()
                && cell::epoch(idx) <= tail_ticket
                && (!cell::is_unsafe(idx)
                    || self.header.head.load(Ordering::Acquire) <= tail_ticket)
            {
                let marker = reserved_marker::<T>(tid);

                // Three-step transition: park the marker, advance the
                // epoch, publish the payload. Losing step (b) means another
                // thread recycled the cell, so the marker is rolled back.
                if cell
                    .val
                    .compare_exchange(
                        std::ptr::null_mut(),
                        marker,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    if cell
                        .idx
                        .compare_exchange(
                            idx,
                            tail_ticket + self.size as u64,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        if cell
                            .val
                            .compare_exchange(
                                marker,
                                item.as_ptr(),
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            return true;
                        }
                        // A consumer reclaimed the slot; take a new ticket.
                    } else {
                        let _ = cell.val.compare_exchange(
                            marker,
                            std::ptr::null_mut(),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                    }
                }
            }

            if tail_ticket >= self.header.head.load(Ordering::Acquire) + self.size as u64 {
                if BOUNDED {
                    return false;
                }
                try_close += 1;
                if self.header.close(tail_ticket, try_close > TRY_CLOSE_PRQ) {
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
                let cell_idx = cell.idx.load(Ordering::Acquire);
                let unsafe_flag = cell_idx & cell::UNSAFE_BIT;
                let idx = cell::epoch(cell_idx);
                let val = cell.val.load(Ordering::Acquire);

                // Value and index were read separately; retry on a torn view.
                if cell.idx.load(Ordering::Acquire) != cell_idx {
                    continue;
                }

                if idx > head_ticket + self.size as u64 {
                    break;
                }

                if !val.is_null() && !is_marker(val) {
                    if idx == head_ticket + self.size as u64 {
                        // Exactly one consumer sees the matching epoch.
                        cell.val.store(std::ptr::null_mut(), Ordering::Release);
                        return NonNull::new(val);
                    }
                    if unsafe_flag != 0 {
                        if cell.idx.load(Ordering::Acquire) == cell_idx {
                            break;
                        }
                    } else if cell
                        .idx
                        .compare_exchange(
                            cell_idx,
                            cell::set_unsafe(idx),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        break;
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
                        // A parked marker must be cleaned out before the
                        // cell can move to the next revolution.
                        if is_marker(val)
                            && cell
                                .val
                                .compare_exchange(
                                    val,
                                    std::ptr::null_mut(),
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_err()
                        {
                            continue;
                        }
                        if cell
                            .idx
                            .compare_exchange(
                                cell_idx,
                                unsafe_flag | (head_ticket + self.size as u64),
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
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

impl<T: Send, P: PaddingMode, const BOUNDED: bool> RingSegment<T> for PrqRing<T, P, BOUNDED> {
    fn with_start(capacity: usize, _max_threads: usize, start: u64) -> Self {
        // The marker encoding claims the pointer LSB.
        assert!(std::mem::align_of::<T>() >= 2);

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
        format!("{}PrqRing{}", bounded, pad)
    }
}

impl<T: Send, P: PaddingMode, const BOUNDED: bool> MpmcQueue<T> for PrqRing<T, P, BOUNDED> {
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
