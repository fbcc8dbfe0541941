//! Concurrent FIFO queues for pointer-sized payloads.
//!
//! The queues exchange raw references between producer and consumer
//! threads: they carry `NonNull<T>` pointers to caller-owned payloads and
//! never copy, drop or otherwise own the pointees. Every operation is
//! non-blocking; bounded variants report a full queue through their return
//! value instead of waiting.
//!
//! Building blocks, smallest first:
//!
//! - [`SpscRing`]: single-producer / single-consumer ring.
//! - [`CrqRing`] / [`PrqRing`] / [`MtqRing`]: bounded MPMC ring segments
//!   differing in their cell transition protocol (128-bit CAS, single-word
//!   CAS with reserved markers, CAS-loop with per-cell sequencing).
//! - [`LinkedAdapter`]: chains segments into an unbounded MPMC queue, with
//!   hazard-pointer reclamation of drained segments.
//! - [`BoundedSegmentAdapter`] / [`BoundedItemAdapter`]: capped variants of
//!   the same chain.
//! - [`MeshQueue`]: a producers x consumers matrix of SPSC rings acting as
//!   one MPMC queue.
//!
//! Thread ids: every MPMC operation takes a `tid`, a small integer unique
//! among concurrently running callers. It indexes the hazard-pointer table
//! and derives the per-thread reserved markers of [`PrqRing`].

pub mod cell;
pub mod hazard;
pub mod mpmc;
pub mod pad;
pub mod remap;
pub mod segment;
pub mod spsc;

pub use mpmc::{
    BoundedCrqQueue, BoundedItemAdapter, BoundedItemCrqQueue, BoundedItemPrqQueue,
    BoundedMtqQueue, BoundedPrqQueue, BoundedSegmentAdapter, BoundedSegmentCrqQueue,
    BoundedSegmentPrqQueue, CrqRing, LinkedAdapter, LinkedCrqQueue, LinkedMtqQueue,
    LinkedPrqQueue, MeshQueue, MtqRing, PrqRing,
};
pub use pad::{CachePadded, Padded, PaddingMode, Unpadded, CACHE_LINE};
pub use segment::RingSegment;
pub use spsc::SpscRing;

use std::ptr::NonNull;

/// Common interface of the MPMC queues.
///
/// `push` returns `false` only on bounded variants; the unbounded linked
/// queues always accept. `length` is advisory: concurrent operations make
/// it a bound, never an exact count.
pub trait MpmcQueue<T>: Send + Sync {
    fn push(&self, item: NonNull<T>, tid: usize) -> bool;
    fn pop(&self, tid: usize) -> Option<NonNull<T>>;
    fn length(&self, tid: usize) -> usize;
    fn capacity(&self) -> usize;
    fn name(padded: bool) -> String
    where
        Self: Sized;
}

/// Common interface of the SPSC rings.
pub trait SpscQueue<T>: Send + Sync {
    fn push(&self, item: NonNull<T>) -> bool;
    fn pop(&self) -> Option<NonNull<T>>;
    /// True when a subsequent `push` may succeed.
    fn available(&self) -> bool;
    /// True when a subsequent `pop` will fail.
    fn empty(&self) -> bool;
}

/// Effective ring size for a requested capacity: the next power of two, so
/// the position computation is a mask, unless `no-pow2` keeps the request
/// as given.
pub(crate) fn effective_size(capacity: usize) -> usize {
    assert!(capacity > 0, "queue capacity must be positive");
    if cfg!(feature = "no-pow2") {
        capacity
    } else {
        capacity.next_power_of_two()
    }
}
