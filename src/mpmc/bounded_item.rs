//! MPMC queue capped by a global item count.
//!
//! The linked chain grows as needed, but a pushed/popped counter pair
//! gates admission: a push first reserves a place on the pushed counter
//! and fails when the difference to the popped counter has reached the
//! capacity. Reserving before inserting keeps the occupancy bound exact;
//! the insert itself cannot fail because the chain always accepts.
//! Counters only ever grow; wrap-around is harmless because only the
//! difference is read.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::hazard::{self, HazardPointers};
use crate::mpmc::linked::{HP_HEAD, HP_TAIL};
use crate::pad::CachePadded;
use crate::segment::RingSegment;
use crate::{effective_size, MpmcQueue};

/// MPMC queue holding at most `capacity` items, segments linked on demand.
pub struct BoundedItemAdapter<T, S: RingSegment<T>> {
    capacity: usize,
    max_threads: usize,
    head: CachePadded<AtomicPtr<S>>,
    tail: CachePadded<AtomicPtr<S>>,
    items_pushed: CachePadded<AtomicU64>,
    items_popped: CachePadded<AtomicU64>,
    hp: HazardPointers<S>,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send, S: RingSegment<T>> Send for BoundedItemAdapter<T, S> {}
unsafe impl<T: Send, S: RingSegment<T>> Sync for BoundedItemAdapter<T, S> {}

impl<T: Send, S: RingSegment<T>> BoundedItemAdapter<T, S> {
    pub fn new(capacity: usize, max_threads: usize) -> Self {
        assert!(max_threads <= hazard::MAX_THREADS);

        let capacity = effective_size(capacity);
        let sentinel = Box::into_raw(Box::new(S::with_start(capacity, max_threads, 0)));
        Self {
            capacity,
            max_threads,
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
            items_pushed: CachePadded::new(AtomicU64::new(0)),
            items_popped: CachePadded::new(AtomicU64::new(0)),
            hp: HazardPointers::new(2, max_threads),
            _marker: PhantomData,
        }
    }

    /// Claims one place on the pushed counter, or fails at capacity.
    fn reserve_item(&self) -> bool {
        loop {
            let pushed = self.items_pushed.load(Ordering::Acquire);
            let popped = self.items_popped.load(Ordering::Acquire);
            if pushed.wrapping_sub(popped) >= self.capacity as u64 {
                return false;
            }
            if self
                .items_pushed
                .compare_exchange_weak(pushed, pushed + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        if !self.reserve_item() {
            return false;
        }

        let mut ltail = self.hp.protect(HP_TAIL, &self.tail, tid);
        loop {
            let current = self.tail.load(Ordering::Acquire);
            if current != ltail {
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
                continue;
            }

            if seg.push(item, tid) {
                self.hp.clear(HP_TAIL, tid);
                return true;
            }

            let new_tail = Box::into_raw(Box::new(S::with_start(
                self.capacity,
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
                    return true;
                }
                Err(winner) => {
                    unsafe { drop(Box::from_raw(new_tail)) };
                    ltail = self.hp.protect_ptr(HP_TAIL, winner, tid);
                }
            }
        }
    }

    pub fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        let mut lhead = self.hp.protect(HP_HEAD, &self.head, tid);
        let item;
        loop {
            let current = self.head.load(Ordering::Acquire);
            if current != lhead {
                lhead = self.hp.protect(HP_HEAD, &self.head, tid);
                continue;
            }
            let seg = unsafe { &*lhead };

            if let Some(found) = seg.pop(tid) {
                item = found;
                break;
            }

            let lnext = seg.header().next.load(Ordering::Acquire);
            if lnext.is_null() {
                self.hp.clear(HP_HEAD, tid);
                return None;
            }

            if let Some(found) = seg.pop(tid) {
                item = found;
                break;
            }

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
        }

        self.hp.clear(HP_HEAD, tid);
        self.items_popped.fetch_add(1, Ordering::Release);
        Some(item)
    }

    /// Item count from the counters; relaxed reads keep it cheap and
    /// approximate.
    pub fn length(&self, _tid: usize) -> usize {
        self.items_pushed
            .load(Ordering::Relaxed)
            .wrapping_sub(self.items_popped.load(Ordering::Relaxed)) as usize
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(padded: bool) -> String {
        format!("BoundedItem{}", S::name(padded))
    }
}

impl<T, S: RingSegment<T>> Drop for BoundedItemAdapter<T, S> {
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

impl<T: Send, S: RingSegment<T>> MpmcQueue<T> for BoundedItemAdapter<T, S> {
    #[inline]
    fn push(&self, item: NonNull<T>, tid: usize) -> bool {
        BoundedItemAdapter::push(self, item, tid)
    }

    #[inline]
    fn pop(&self, tid: usize) -> Option<NonNull<T>> {
        BoundedItemAdapter::pop(self, tid)
    }

    fn length(&self, tid: usize) -> usize {
        BoundedItemAdapter::length(self, tid)
    }

    fn capacity(&self) -> usize {
        BoundedItemAdapter::capacity(self)
    }

    fn name(padded: bool) -> String {
        BoundedItemAdapter::<T, S>::name(padded)
    }
}
