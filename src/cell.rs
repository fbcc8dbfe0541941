//! Ring cells: an atomic (value, index) pair per slot.
//!
//! The index word carries the cell's epoch in its low 63 bits and the
//! unsafe flag in the MSB. The epoch is the logical ring position the cell
//! currently serves; it advances by the ring size once per revolution, so a
//! ticket can always tell whether a cell is behind, current, or already
//! recycled.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use portable_atomic::AtomicU128;

use crate::pad::PaddingMode;

/// MSB of the index word: a consumer skipped this cell and producers must
/// consult `head` before reusing it.
pub const UNSAFE_BIT: u64 = 1 << 63;

#[inline(always)]
pub fn epoch(word: u64) -> u64 {
    word & !UNSAFE_BIT
}

#[inline(always)]
pub fn is_unsafe(word: u64) -> bool {
    word & UNSAFE_BIT != 0
}

#[inline(always)]
pub fn set_unsafe(word: u64) -> u64 {
    word | UNSAFE_BIT
}

/// Cell with independently-atomic value and index words, for rings that
/// transition them with single-word CAS.
#[repr(C)]
pub struct PairCell<T, P: PaddingMode> {
    pub val: AtomicPtr<T>,
    pub idx: AtomicU64,
    _pad: P::PairPad,
}

impl<T, P: PaddingMode> PairCell<T, P> {
    pub fn new() -> Self {
        Self {
            val: AtomicPtr::new(std::ptr::null_mut()),
            idx: AtomicU64::new(0),
            _pad: Default::default(),
        }
    }

    /// Pre-fills the cell for its first epoch. Only used during ring
    /// construction, before the ring is shared.
    pub fn init(&self, idx: u64) {
        self.val.store(std::ptr::null_mut(), Ordering::Relaxed);
        self.idx.store(idx, Ordering::Relaxed);
    }
}

/// Cell whose (value, index) pair is one 128-bit atomic, for rings that
/// need the two words to change together.
#[repr(C)]
pub struct WideCell<T, P: PaddingMode> {
    pub pair: AtomicU128,
    _pad: P::PairPad,
    _marker: PhantomData<*mut T>,
}

impl<T, P: PaddingMode> WideCell<T, P> {
    pub fn new() -> Self {
        Self {
            pair: AtomicU128::new(0),
            _pad: Default::default(),
            _marker: PhantomData,
        }
    }

    pub fn init(&self, idx: u64) {
        self.pair
            .store(pack(std::ptr::null_mut::<T>(), idx), Ordering::Relaxed);
    }
}

// The raw pointer marker only exists to tie the cell to its payload type.
unsafe impl<T, P: PaddingMode> Send for WideCell<T, P> {}
unsafe impl<T, P: PaddingMode> Sync for WideCell<T, P> {}

/// Packs a value pointer (low half) and an index word (high half).
#[inline(always)]
pub fn pack<T>(val: *mut T, idx: u64) -> u128 {
    (val as usize as u128) | ((idx as u128) << 64)
}

#[inline(always)]
pub fn unpack<T>(pair: u128) -> (*mut T, u64) {
    (pair as u64 as usize as *mut T, (pair >> 64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips() {
        let mut x = 7u32;
        let p = &mut x as *mut u32;
        let (val, idx) = unpack::<u32>(pack(p, 12345));
        assert_eq!(val, p);
        assert_eq!(idx, 12345);
    }

    #[test]
    fn unsafe_bit_is_disjoint_from_epoch() {
        let word = set_unsafe(42);
        assert!(is_unsafe(word));
        assert_eq!(epoch(word), 42);
        assert!(!is_unsafe(epoch(word)));
    }
}
