//! Cache-line padding helpers shared by every queue in the crate.

/// Assumed cache-line size on the targets we care about.
pub const CACHE_LINE: usize = 64;

/// Wrapper that aligns its contents to a cache line so that two adjacent
/// fields never share one.
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> std::ops::DerefMut for CachePadded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Selects whether ring cells are stored one per cache line or densely.
///
/// Dense storage accepts false sharing between neighbouring cells; the
/// padded layout trades memory for isolation. Queues take this as a type
/// parameter so the choice is made at compile time.
pub trait PaddingMode: Send + Sync + 'static {
    const PADDED: bool;
    /// Filler appended to a 16-byte (value, index) cell.
    type PairPad: Default + Send + Sync;
    /// Filler appended to an 8-byte single-pointer slot.
    type SlotPad: Default + Send + Sync;
}

/// One cell per cache line.
#[derive(Default)]
pub struct Padded;

/// Cells stored densely.
#[derive(Default)]
pub struct Unpadded;

#[repr(C)]
#[derive(Default)]
pub struct NoPad;

#[repr(C)]
pub struct PairPad {
    _pad: [u8; CACHE_LINE - 16],
}

impl Default for PairPad {
    fn default() -> Self {
        Self {
            _pad: [0; CACHE_LINE - 16],
        }
    }
}

#[repr(C)]
pub struct SlotPad {
    _pad: [u8; CACHE_LINE - 8],
}

impl Default for SlotPad {
    fn default() -> Self {
        Self {
            _pad: [0; CACHE_LINE - 8],
        }
    }
}

impl PaddingMode for Padded {
    const PADDED: bool = true;
    type PairPad = PairPad;
    type SlotPad = SlotPad;
}

impl PaddingMode for Unpadded {
    const PADDED: bool = false;
    type PairPad = NoPad;
    type SlotPad = NoPad;
}
