//! Unbounded MPMC queue chaining ring segments.
//!
//! Producers work on the tail segment; when it closes they allocate a
//! successor and race one CAS to link it. Consumers drain the head segment
//! and retire it through the hazard table once a successor exists. Every
//! shared segment pointer is protected before it is dereferenced, because
//! the thread that retires a segment may otherwise free it mid-access.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::hazard::{self, HazardPointers};
use crate::pad::CachePadded;
use crate::segment::RingSegment;
use crate::MpmcQueue;

pub(crate) const HP_TAIL: usize = 0;
pub(crate) const HP_HEAD: usize = 1;

/// Unbounded MPMC queue over any ring segment type. Push never fails.
pub struct LinkedAdapter<T, S: RingSegment<T>> {
    seg_size: usize,
    max_threads: usize,
    head: CachePadded<AtomicPtr<S>>,
    tail: CachePadded<AtomicPtr<S>>,
    hp: HazardPointers<S>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, S: RingSegment<T>> Send for LinkedAdapter<T, S> {}
unsafe impl<T: Send, S: RingSegment<T>> Sync for LinkedAdapter<T, S> {}

impl<T: Send, S: RingSegment<T>> LinkedAdapter<T, S> {
    /// Creates the queue with one sentinel segment of `seg_size` cells.
    /// `max_threads` bounds the thread ids that may call in concurrently.
    pub fn new(seg_size: usize, max_threads: usize) -> Self {
        assert!(max_threads <= hazard::MAX_THREADS);

        let sentinel = Box::into_raw(Box::new(S::with_start(seg_size, max_threads, 0)));
        Self {
            seg_size,
            max_threads,
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            hp: HazardPointers::new(2, max_threads),
            _marker: PhantomData,
        }
    }

    pub fn push(&self, item: NonNull<T>, tid: usize) {
        let mut ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        loop {
            // Re-validate: the protected pointer must still be the shared
            // tail before it is safe to dereference.
            let current = self.tail.load(Ordering::Acquire);
            if current != ltail {
                ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
                continue;
            }
            let seg = unsafe { &*ltail };

            let lnext = seg.header().next.load(Ordering::Acquire);
            if !lnext.is_null() {
                // A successor exists: help swing the tail over, then retry
                // there.
                ltail = if self
                    .tail
                    .compare_exchange(ltail, lnext, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.hp.protect_ptr(HP_TAIL, lnext, tid)
                } else {
                    self.hp.protect(HP_TAIL, &self.tail, tid)
                };
                continue;
            }

            if seg.push(item, tid) {
                self.hp.clear(HP_TAIL, tid);
                return;
            }

            // Segment closed: build a successor that already carries the
            // item, so linking it completes the push.
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
                    self.hp.clear(HP_TAIL, tid);
                    return;
                }
                Err(winner) => {
                    // Another producer linked first; discard ours (the
                    // payload is only a borrowed pointer) and push again on
                    // the winner's segment.
                    unsafe { drop(Box::from_raw(new_tail)) };
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
                    // A producer may still be completing a push that raced
                    // with the link; one more look before moving on.
                    item = seg.pop(tid);
                    if item.is_none() {
                        if self
                            .head
                            .compare_exchange(lhead, lnext, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            unsafe { self.hp.retire(lhead, tid) };
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

    /// Advisory length: the spread between the last and first segment's
    /// indices. Concurrent operations make this a bound, not a count.
    pub fn length(&self, tid: usize) -> usize {
        let lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        let ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        let t = unsafe { (*ltail).tail_index() };
        let h = unsafe { (*lhead).head_index() };
        self.hp.clear_all(tid);
        t.saturating_sub(h) as usize
    }

    pub fn capacity(&self) -> usize {
        self.seg_size
    }

    pub fn name(padded: bool) -> String {
        format!("Linked{}", S::name(padded))
    }
}

impl<T, S: RingSegment<T>> Drop for LinkedAdapter<T, S> {
    fn drop(&mut self) {
        // Walk the chain and free every live segment; payloads are caller
        // owned. Retired segments are freed by the hazard table's drop.
        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).header().next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}

impl<T: Send, S: RingSegment<T>> MpmcQueue<T> for LinkedAdapter<T, S> {
    #[inline]
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        LinkedAdapter::push(self, item, tid);
        true
    }

    #[inline]
    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        LinkedAdapter::pop(self, tid)
    }

    fn length(&self, tid: usize) -> usize {
        LinkedAdapter::length(self, tid)
    }

    fn capacity(&self) -> usize {
        LinkedAdapter::capacity(self)
    }

    fn name(padded: bool) -> String {
        LinkedAdapter::<T, S>::name(padded)
    }
}
