//! MPMC queue that chains ring segments up to a fixed segment budget.
//!
//! Same linking protocol as the unbounded adapter, but a segment slot must
//! be reserved on a counter pair before a new segment may be linked, so the
//! number of live segments never exceeds the budget. When no slot is free
//! the push reports failure instead of linking.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};

use crate::hazard::{self, HazardPointers};
use crate::mpmc::linked::{HP_HEAD, HP_TAIL};
use crate::pad::CachePadded;
use crate::segment::RingSegment;
use crate::{effective_size, MpmcQueue};

/// Default cap on live segments. Low on purpose: each extra segment adds a
/// pointer chase to every drain.
pub const MAX_SEGMENTS: usize = 4;

/// MPMC queue holding at most `max_segments` live ring segments.
pub struct BoundedSegmentAdapter<T, S: RingSegment<T>> {
    max_segments: usize,
    seg_size: usize,
    max_threads: usize,
    head: CachePadded<AtomicPtr<S>>,
    tail: CachePadded<AtomicPtr<S>>,
    // seg_tail - seg_head + 1 counts live segments (sentinel included).
    seg_tail: CachePadded<AtomicU64>,
    seg_head: CachePadded<AtomicU64>,
    // Per-thread flag: the last push saw the current tail closed, so check
    // `is_closed` before paying for another ticket.
    skip_push: Box<[CachePadded<AtomicBool>]>,
    hp: HazardPointers<S>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, S: RingSegment<T>> Send for BoundedSegmentAdapter<T, S> {}
unsafe impl<T: Send, S: RingSegment<T>> Sync for BoundedSegmentAdapter<T, S> {}

impl<T: Send, S: RingSegment<T>> BoundedSegmentAdapter<T, S> {
    /// Creates a queue of roughly `capacity` cells split across the default
    /// segment budget.
    pub fn new(capacity: usize, max_threads: usize) -> Self {
        Self::with_segments(capacity, max_threads, MAX_SEGMENTS)
    }

    /// As `new` with an explicit segment budget.
    pub fn with_segments(capacity: usize, max_threads: usize, max_segments: usize) -> Self {
        assert!(max_threads <= hazard::MAX_THREADS);
        assert!(max_segments > 0);

        let seg_size = if cfg!(feature = "no-pow2") {
            capacity
        } else {
            effective_size(capacity) / max_segments
        };
        assert!(seg_size > 0);

        let sentinel = Box::into_raw(Box::new(S::with_start(seg_size, max_threads, 0)));
        Self {
            max_segments,
            seg_size,
            max_threads,
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            seg_tail: CachePadded::new(AtomicU64::new(0)),
            seg_head: CachePadded::new(AtomicU64::new(0)),
            skip_push: (0..max_threads)
                .map(|_| CachePadded::new(AtomicBool::new(false)))
                .collect(),
            hp: HazardPointers::new(2, max_threads),
            _marker: PhantomData,
        }
    }

    /// Reserves one segment slot, or fails when the budget is spent.
    fn reserve_segment(&self) -> bool {
        loop {
            let ct = self.seg_tail.load(Ordering::Acquire);
            let ch = self.seg_head.load(Ordering::Acquire);
            if ct.wrapping_sub(ch) + 1 >= self.max_segments as u64 {
                return false;
            }
            if self
                .seg_tail
                .compare_exchange(ct, ct + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        let mut ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        loop {
            let current = self.tail.load(Ordering::Acquire);
            if current != ltail {
                self.skip_push[tid].store(false, Ordering::Relaxed);
                ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
                continue;
            }
            let seg = unsafe { &*ltail };

            let lnext = seg.header().next.load(Ordering::Acquire);
            if !lnext.is_null() {
                ltail = if self
                    .tail
                    .compare_exchange(ltail, lnext, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.hp.protect_ptr(HP_TAIL, lnext, tid)
                } else {
                    self.hp.protect(HP_TAIL, &self.tail, tid)
                };
                self.skip_push[tid].store(false, Ordering::Relaxed);
                continue;
            }

            let mut skip = self.skip_push[tid].load(Ordering::Relaxed);
            if skip {
                skip = seg.is_closed();
                self.skip_push[tid].store(skip, Ordering::Relaxed);
            }
            if !skip {
                if seg.push(item, tid) {
                    self.hp.clear(HP_TAIL, tid);
                    return true;
                }
                self.skip_push[tid].store(true, Ordering::Relaxed);
            }

            if !self.reserve_segment() {
                self.hp.clear(HP_TAIL, tid);
                return false;
            }

            let new_tail = Box::into_raw(Box::new(S::with_start(
                self.seg_size,
                self.max_threads,
                seg.next_start_index(),
            )));
            let pushed = unsafe { (*new_tail).push(item, tid) };
            debug_assert!(pushed, "fresh segment rejected a push");

            match seg.header().next.compare_exchange(
                std::ptr::null_mut(),
                new_tail,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let _ = self.tail.compare_exchange(
                        ltail,
                        new_tail,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                    self.skip_push[tid].store(false, Ordering::Relaxed);
                    self.hp.clear(HP_TAIL, tid);
                    return true;
                }
                Err(winner) => {
                    unsafe { drop(Box::from_raw(new_tail)) };
                    // Give the reservation back; the winner took its own.
                    self.seg_tail.fetch_sub(1, Ordering::AcqRel);
                    self.skip_push[tid].store(false, Ordering::Relaxed);
                    ltail = self.hp.protect_ptr(HP_TAIL, winner, tid);
                }
            }
        }
    }

    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        let mut lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        loop {
            let current = self.head.load(Ordering::Acquire);
            if current != lhead {
                lhead = self.hp.protect(HP_HEAD, &self.head, tid);
                continue;
            }
            let seg = unsafe { &*lhead };

            let mut item = seg.pop(tid);
            if item.is_none() {
                let lnext = seg.header().next.load(Ordering::Acquire);
                if !lnext.is_null() {
                    item = seg.pop(tid);
                    if item.is_none() {
                        if self
                            .head
                            .compare_exchange(lhead, lnext, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            unsafe { self.hp.retire(lhead, tid) };
                            self.seg_head.fetch_add(1, Ordering::Release);
                            lhead = self.hp.protect_ptr(HP_HEAD, lnext, tid);
                        } else {
                            lhead = self.hp.protect(HP_HEAD, &self.head, tid);
                        }
                        continue;
                    }
                }
            }

            self.hp.clear(HP_HEAD, tid);
            return item;
        }
    }

    pub fn length(&self, tid: usize) -> usize {
        let lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        let ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        let t = unsafe { (*ltail).tail_index() };
        let h = unsafe { (*lhead).head_index() };
        self.hp.clear_all(tid);
        t.saturating_sub(h) as usize
    }

    /// Live segments right now, sentinel included.
    pub fn segment_count(&self) -> usize {
        let ct = self.seg_tail.load(Ordering::Acquire);
        let ch = self.seg_head.load(Ordering::Acquire);
        (ct.wrapping_sub(ch) + 1) as usize
    }

    pub fn capacity(&self) -> usize {
        self.seg_size
    }

    pub fn name(padded: bool) -> String {
        format!("BoundedSegment{}", S::name(padded))
    }
}

impl<T, S: RingSegment<T>> Drop for BoundedSegmentAdapter<T, S> {
    fn drop(&mut self) {
        // Freeing segments directly is equivalent to draining first: the
        // cells hold caller-owned pointers, never anything to drop.
        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).header().next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}

impl<T: Send, S: RingSegment<T>> MpmcQueue<T> for BoundedSegmentAdapter<T, S> {
    #[inline]
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        BoundedSegmentAdapter::push(self, item, tid)
    }

    #[inline]
    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        BoundedSegmentAdapter::pop(self, tid)
    }

    fn length(&self, tid: usize) -> usize {
        BoundedSegmentAdapter::length(self, tid)
    }

    fn capacity(&self) -> usize {
        BoundedSegmentAdapter::capacity(self)
    }

    fn name(padded: bool) -> String {
        BoundedSegmentAdapter::<T, S>::name(padded)
    }
}
