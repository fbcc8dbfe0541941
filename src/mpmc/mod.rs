pub mod all2all;
pub mod bounded_item;
pub mod bounded_segment;
pub mod crq;
pub mod linked;
pub mod mtq;
pub mod prq;

pub use all2all::MeshQueue;
pub use bounded_item::BoundedItemAdapter;
pub use bounded_segment::BoundedSegmentAdapter;
pub use crq::CrqRing;
pub use linked::LinkedAdapter;
pub use mtq::MtqRing;
pub use prq::PrqRing;

use crate::pad::Padded;

// Ready-made compositions. The `Padded` default trades memory for cell
// isolation; swap in `Unpadded` to store cells densely.

/// Unbounded queue over double-word-CAS segments.
pub type LinkedCrqQueue<T, P = Padded> = LinkedAdapter<T, CrqRing<T, P, false>>;
/// Unbounded queue over single-word-CAS segments.
pub type LinkedPrqQueue<T, P = Padded> = LinkedAdapter<T, PrqRing<T, P, false>>;
/// Unbounded queue over CAS-loop segments.
pub type LinkedMtqQueue<T, P = Padded> = LinkedAdapter<T, MtqRing<T, P, false>>;

/// Single bounded double-word-CAS ring.
pub type BoundedCrqQueue<T, P = Padded> = CrqRing<T, P, true>;
/// Single bounded single-word-CAS ring.
pub type BoundedPrqQueue<T, P = Padded> = PrqRing<T, P, true>;
/// Single bounded CAS-loop ring.
pub type BoundedMtqQueue<T, P = Padded> = MtqRing<T, P, true>;

/// Segment-capped queue over double-word-CAS segments.
pub type BoundedSegmentCrqQueue<T, P = Padded> = BoundedSegmentAdapter<T, CrqRing<T, P, false>>;
/// Segment-capped queue over single-word-CAS segments.
pub type BoundedSegmentPrqQueue<T, P = Padded> = BoundedSegmentAdapter<T, PrqRing<T, P, false>>;

/// Item-capped queue over double-word-CAS segments.
pub type BoundedItemCrqQueue<T, P = Padded> = BoundedItemAdapter<T, CrqRing<T, P, false>>;
/// Item-capped queue over single-word-CAS segments.
pub type BoundedItemPrqQueue<T, P = Padded> = BoundedItemAdapter<T, PrqRing<T, P, false>>;
