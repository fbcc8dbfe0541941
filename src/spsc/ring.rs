//! Single-producer / single-consumer ring.
//!
//! One pointer slot per cell; a slot is empty iff it is null, so the two
//! sides never compare indices. The producer owns `tail`, the consumer
//! owns `head`, and the slot contents carry the synchronisation.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::pad::{CachePadded, Padded, PaddingMode};
use crate::{effective_size, SpscQueue};

#[repr(C)]
struct Slot<T, P: PaddingMode> {
    val: AtomicPtr<T>,
    _pad: P::SlotPad,
}

/// Bounded SPSC ring. `push` must only ever be called by one thread at a
/// time, and `pop` by one thread at a time; the two may differ.
pub struct SpscRing<T, P: PaddingMode = Padded> {
    // Owned by the consumer; producers never touch it.
    head: CachePadded<AtomicU64>,
    // Owned by the producer.
    tail: CachePadded<AtomicU64>,
    slots: Box<[Slot<T, P>]>,
    size: u64,
}

unsafe impl<T: Send, P: PaddingMode> Send for SpscRing<T, P> {}
unsafe impl<T: Send, P: PaddingMode> Sync for SpscRing<T, P> {}

impl<T, P: PaddingMode> SpscRing<T, P> {
    pub fn new(capacity: usize) -> Self {
        let size = effective_size(capacity);
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            slots: (0..size)
                .map(|_| Slot {
                    val: AtomicPtr::new(std::ptr::null_mut()),
                    _pad: Default::default(),
                })
                .collect(),
            size: size as u64,
        }
    }

    // Indices stay inside [0, size); wrap without a modulo.
    #[inline(always)]
    fn advance(&self, i: u64) -> u64 {
        let next = i + 1;
        if next == self.size {
            0
        } else {
            next
        }
    }

    pub fn push(&self, item: NonNull<T>) -> bool {
        let t = self.tail.load(Ordering::Relaxed);
        let slot = &self.slots[t as usize];
        if !slot.val.load(Ordering::Acquire).is_null() {
            return false;
        }
        slot.val.store(item.as_ptr(), Ordering::Release);
        self.tail.store(self.advance(t), Ordering::Relaxed);
        true
    }

    pub fn pop(&self) -> Option<NonNull<T>> {
        let h = self.head.load(Ordering::Relaxed);
        let slot = &self.slots[h as usize];
        let item = NonNull::new(slot.val.load(Ordering::Acquire))?;
        slot.val.store(std::ptr::null_mut(), Ordering::Release);
        self.head.store(self.advance(h), Ordering::Relaxed);
        Some(item)
    }

    /// True when the next push may succeed.
    pub fn available(&self) -> bool {
        let t = self.tail.load(Ordering::Relaxed);
        self.slots[t as usize].val.load(Ordering::Acquire).is_null()
    }

    /// True when the next pop will fail.
    pub fn empty(&self) -> bool {
        let h = self.head.load(Ordering::Relaxed);
        self.slots[h as usize].val.load(Ordering::Acquire).is_null()
    }

    pub fn capacity(&self) -> usize {
        self.size as usize
    }

    /// Rough occupancy from the index spread. A completely full ring reads
    /// as 0, so treat the result as advisory only.
    pub fn length(&self) -> usize {
        let h = self.head.load(Ordering::Relaxed);
        let t = self.tail.load(Ordering::Relaxed);
        ((t + self.size - h) % self.size) as usize
    }

    pub fn name(_padded: bool) -> String {
        "SpscRing".to_string()
    }
}

impl<T: Send, P: PaddingMode> SpscQueue<T> for SpscRing<T, P> {
    #[inline]
    fn push(&self, item: NonNull<T>) -> bool {
        SpscRing::push(self, item)
    }

    #[inline]
    fn pop(&self) -> Option<NonNull<T>> {
        SpscRing::pop(self)
    }

    fn available(&self) -> bool {
        SpscRing::available(self)
    }

    fn empty(&self) -> bool {
        SpscRing::empty(self)
    }
}
