//! Single-threaded behaviour of every queue variant: construction, FIFO
//! round-trips, overflow and recovery.

use std::ptr::NonNull;

use ringflux::{
    BoundedCrqQueue, BoundedItemCrqQueue, BoundedItemPrqQueue, BoundedMtqQueue, BoundedPrqQueue,
    BoundedSegmentCrqQueue, BoundedSegmentPrqQueue, LinkedCrqQueue, LinkedMtqQueue,
    LinkedPrqQueue, MpmcQueue, SpscRing, Unpadded,
};

const SIZE: usize = 20;
const THREADS: usize = 128;

fn ptr_of(slot: &u64) -> NonNull<u64> {
    NonNull::from(slot)
}

macro_rules! bounded_sequential {
    ($name:ident, $make:expr) => {
        mod $name {
            use super::*;

            #[test]
            fn starts_empty() {
                let queue = $make;
                assert_eq!(queue.length(0), 0);
                for _ in 0..queue.capacity() * 2 {
                    assert_eq!(queue.pop(0), None);
                }
                assert_eq!(queue.length(0), 0);
            }

            #[test]
            fn push_pop_round_trip() {
                let queue = $make;
                let items = vec![0u64; queue.capacity() * 2];
                for i in 0..queue.capacity() * 5 {
                    let slot = &items[i % items.len()];
                    assert!(queue.push(ptr_of(slot), 0));
                    assert_eq!(queue.pop(0), Some(ptr_of(slot)));
                }
            }

            #[test]
            fn overflow_rejects_then_recovers() {
                let queue = $make;
                let cap = queue.capacity();
                let items = vec![0u64; cap * 5];

                for slot in items.iter().take(cap) {
                    assert!(queue.push(ptr_of(slot), 0));
                }
                for slot in items.iter().skip(cap) {
                    assert!(!queue.push(ptr_of(slot), 0));
                }

                // Pops return the accepted items in push order.
                for slot in items.iter().take(cap) {
                    assert_eq!(queue.pop(0), Some(ptr_of(slot)));
                }
                for _ in cap..items.len() {
                    assert_eq!(queue.pop(0), None);
                }

                // One slot freed means one push accepted again.
                assert!(queue.push(ptr_of(&items[0]), 0));
                assert_eq!(queue.pop(0), Some(ptr_of(&items[0])));
            }
        }
    };
}

macro_rules! unbounded_sequential {
    ($name:ident, $make:expr) => {
        mod $name {
            use super::*;

            #[test]
            fn starts_empty() {
                let queue = $make;
                assert_eq!(queue.length(0), 0);
                for _ in 0..queue.capacity() * 2 {
                    assert_eq!(queue.pop(0), None);
                }
            }

            #[test]
            fn push_pop_round_trip() {
                let queue = $make;
                let items = vec![0u64; queue.capacity() * 2];
                for i in 0..queue.capacity() * 5 {
                    let slot = &items[i % items.len()];
                    queue.push(ptr_of(slot), 0);
                    assert_eq!(queue.pop(0), Some(ptr_of(slot)));
                }
            }

            #[test]
            fn overflow_links_new_segments() {
                let queue = $make;
                let items = vec![0u64; queue.capacity() * 2];
                let ops = queue.capacity() * 5;

                // Five times the segment size: the chain has to grow.
                for i in 0..ops {
                    queue.push(ptr_of(&items[i % items.len()]), 0);
                }
                // Advisory length: in the right ballpark, not exact.
                assert!(queue.length(0) > 0);
                for i in 0..ops {
                    assert_eq!(queue.pop(0), Some(ptr_of(&items[i % items.len()])));
                }
                assert_eq!(queue.pop(0), None);
            }
        }
    };
}

bounded_sequential!(bounded_crq, BoundedCrqQueue::<u64>::new(SIZE, THREADS));
bounded_sequential!(bounded_prq, BoundedPrqQueue::<u64>::new(SIZE, THREADS));
bounded_sequential!(bounded_mtq, BoundedMtqQueue::<u64>::new(SIZE, THREADS));
bounded_sequential!(
    bounded_crq_dense,
    BoundedCrqQueue::<u64, Unpadded>::new(SIZE, THREADS)
);
bounded_sequential!(
    bounded_prq_dense,
    BoundedPrqQueue::<u64, Unpadded>::new(SIZE, THREADS)
);
bounded_sequential!(bounded_item_crq, BoundedItemCrqQueue::<u64>::new(SIZE, THREADS));
bounded_sequential!(bounded_item_prq, BoundedItemPrqQueue::<u64>::new(SIZE, THREADS));

unbounded_sequential!(linked_crq, LinkedCrqQueue::<u64>::new(SIZE, THREADS));
unbounded_sequential!(linked_prq, LinkedPrqQueue::<u64>::new(SIZE, THREADS));
unbounded_sequential!(linked_mtq, LinkedMtqQueue::<u64>::new(SIZE, THREADS));
unbounded_sequential!(
    linked_prq_dense,
    LinkedPrqQueue::<u64, Unpadded>::new(SIZE, THREADS)
);

mod bounded_segment {
    use super::*;

    #[test]
    fn behaves_fifo_within_budget() {
        let queue = BoundedSegmentCrqQueue::<u64>::with_segments(64, THREADS, 4);
        let items = vec![0u64; 16];
        for slot in items.iter() {
            assert!(queue.push(ptr_of(slot), 0));
        }
        for slot in items.iter() {
            assert_eq!(queue.pop(0), Some(ptr_of(slot)));
        }
        assert_eq!(queue.pop(0), None);
    }

    #[test]
    fn refuses_past_segment_budget() {
        let queue = BoundedSegmentPrqQueue::<u64>::with_segments(16, THREADS, 2);
        let per_seg = queue.capacity();
        let items = vec![0u64; per_seg * 8];

        let mut accepted = 0;
        for slot in items.iter() {
            if !queue.push(ptr_of(slot), 0) {
                break;
            }
            accepted += 1;
        }
        assert!(accepted <= per_seg * 2);
        assert!(queue.segment_count() <= 2);

        // Draining reopens the queue.
        for slot in items.iter().take(accepted) {
            assert_eq!(queue.pop(0), Some(ptr_of(slot)));
        }
        assert_eq!(queue.pop(0), None);
        assert!(queue.push(ptr_of(&items[0]), 0));
    }
}

mod bounded_item {
    use super::*;

    #[test]
    fn cap_counts_items_not_cells() {
        let queue = BoundedItemCrqQueue::<u64>::new(SIZE, THREADS);
        let cap = queue.capacity();
        let items = vec![0u64; cap + 1];

        for slot in items.iter().take(cap) {
            assert!(queue.push(ptr_of(slot), 0));
        }
        assert_eq!(queue.length(0), cap);
        assert!(!queue.push(ptr_of(&items[cap]), 0));

        assert_eq!(queue.pop(0), Some(ptr_of(&items[0])));
        assert!(queue.push(ptr_of(&items[cap]), 0));
        assert!(!queue.push(ptr_of(&items[0]), 0));
    }
}

mod spsc {
    use super::*;

    #[test]
    fn starts_empty() {
        let ring = SpscRing::<u64>::new(SIZE);
        assert!(ring.empty());
        assert!(ring.available());
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn push_pop_round_trip() {
        let ring = SpscRing::<u64>::new(SIZE);
        let items = vec![0u64; ring.capacity() * 2];
        for i in 0..ring.capacity() * 5 {
            let slot = &items[i % items.len()];
            assert!(ring.push(ptr_of(slot)));
            assert_eq!(ring.pop(), Some(ptr_of(slot)));
        }
        assert!(ring.empty());
    }

    #[test]
    fn fills_to_capacity_exactly() {
        let ring = SpscRing::<u64>::new(8);
        let items = vec![0u64; 9];
        for slot in items.iter().take(8) {
            assert!(ring.push(ptr_of(slot)));
        }
        assert!(!ring.available());
        assert!(!ring.push(ptr_of(&items[8])));

        for slot in items.iter().take(8) {
            assert_eq!(ring.pop(), Some(ptr_of(slot)));
        }
        assert_eq!(ring.pop(), None);
    }

    #[test]
    fn wraps_many_revolutions() {
        let ring = SpscRing::<u64, Unpadded>::new(4);
        let items = vec![0u64; 3];
        for round in 0..100 {
            for slot in items.iter() {
                assert!(ring.push(ptr_of(slot)), "round {}", round);
            }
            for slot in items.iter() {
                assert_eq!(ring.pop(), Some(ptr_of(slot)));
            }
        }
    }
}

mod names {
    use super::*;
    use ringflux::MeshQueue;

    #[test]
    fn adapters_prefix_segment_names() {
        assert_eq!(
            <LinkedCrqQueue<u64> as MpmcQueue<u64>>::name(true),
            "LinkedCrqRing/padded"
        );
        assert_eq!(
            <LinkedPrqQueue<u64> as MpmcQueue<u64>>::name(false),
            "LinkedPrqRing"
        );
        assert_eq!(
            <BoundedSegmentCrqQueue<u64> as MpmcQueue<u64>>::name(true),
            "BoundedSegmentCrqRing/padded"
        );
        assert_eq!(
            <BoundedItemPrqQueue<u64> as MpmcQueue<u64>>::name(true),
            "BoundedItemPrqRing/padded"
        );
        assert_eq!(
            <BoundedMtqQueue<u64> as MpmcQueue<u64>>::name(true),
            "BoundedMtqRing/padded"
        );
        assert_eq!(
            <BoundedCrqQueue<u64, Unpadded> as MpmcQueue<u64>>::name(true),
            "BoundedCrqRing"
        );
        assert_eq!(<MeshQueue<u64> as MpmcQueue<u64>>::name(true), "MeshQueue");
    }

    #[test]
    fn capacity_reports_effective_size() {
        let queue = BoundedCrqQueue::<u64>::new(SIZE, THREADS);
        if cfg!(feature = "no-pow2") {
            assert_eq!(queue.capacity(), SIZE);
        } else {
            assert_eq!(queue.capacity(), SIZE.next_power_of_two());
        }
    }
}
