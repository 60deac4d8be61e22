//! Integration tests for how `FixedPool` uses its `SlabAllocator`.
//!
//! These tests plug in an allocator that records every block it hands out and takes back, which
//! lets us verify slab sizing, reuse before growth, bulk release and behavior under allocation
//! failure without relying on the global allocator.

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::iter;
use std::ptr::NonNull;

use fixed_pool::{Error, FixedPool, Result, SlabAllocator, SystemAllocator};
use new_zealand::nz;

type Item = [usize; 2];

/// Forwards to the system allocator while recording allocations and releases.
#[derive(Debug, Default)]
struct TrackingAllocator {
    live: RefCell<Vec<(NonNull<u8>, Layout)>>,
    allocations: RefCell<Vec<Layout>>,
    releases: Cell<usize>,

    /// When set, every allocation request fails.
    exhausted: Cell<bool>,
}

impl TrackingAllocator {
    fn slab_item_counts(&self) -> Vec<usize> {
        self.allocations
            .borrow()
            .iter()
            .map(|layout| layout.size() / size_of::<Item>())
            .collect()
    }

    fn live_blocks(&self) -> usize {
        self.live.borrow().len()
    }
}

// SAFETY: We forward to the system allocator, which upholds the contract.
unsafe impl SlabAllocator for TrackingAllocator {
    fn allocate_contiguous(&self, layout: Layout) -> Result<NonNull<u8>> {
        if self.exhausted.get() {
            return Err(Error::allocation_failure(layout));
        }

        let block = SystemAllocator.allocate_contiguous(layout)?;

        self.live.borrow_mut().push((block, layout));
        self.allocations.borrow_mut().push(layout);

        Ok(block)
    }

    unsafe fn release_block(&self, block: NonNull<u8>, layout: Layout) {
        {
            let mut live = self.live.borrow_mut();

            let position = live
                .iter()
                .position(|&(live_block, live_layout)| {
                    live_block == block && live_layout == layout
                })
                .expect("released a block that is not live or with a mismatched layout");

            live.swap_remove(position);
        }

        self.releases.set(self.releases.get() + 1);

        // SAFETY: The block came from the system allocator with this layout, as verified above.
        unsafe {
            SystemAllocator.release_block(block, layout);
        }
    }
}

#[test]
fn empty_pool_never_touches_allocator() {
    let allocator = TrackingAllocator::default();

    {
        let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);
        pool.destroy();
    }

    assert!(allocator.allocations.borrow().is_empty());
    assert_eq!(allocator.releases.get(), 0);
}

#[test]
fn scenario_with_capacity_then_growth() {
    let allocator = TrackingAllocator::default();

    let mut pool = FixedPool::<Item>::builder()
        .initial_capacity(nz!(4))
        .allocator(&allocator)
        .build()
        .unwrap();

    let mut items = HashSet::new();

    for _ in 0..4 {
        assert!(items.insert(pool.acquire().unwrap()));
    }

    assert_eq!(allocator.slab_item_counts(), [4]);

    assert!(items.insert(pool.acquire().unwrap()));

    assert_eq!(allocator.slab_item_counts(), [4, 8]);
}

#[test]
fn scenario_empty_then_first_growth() {
    let allocator = TrackingAllocator::default();
    let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

    _ = pool.acquire().unwrap();
    assert_eq!(allocator.slab_item_counts(), [8]);

    for _ in 0..7 {
        _ = pool.acquire().unwrap();
    }

    assert_eq!(allocator.slab_item_counts(), [8]);
}

#[test]
fn scenario_release_then_acquire_is_lifo() {
    let allocator = TrackingAllocator::default();
    let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

    let x = pool.acquire().unwrap();

    // SAFETY: Came from this pool, released once.
    unsafe {
        pool.release(x);
    }

    assert_eq!(pool.acquire().unwrap(), x);
    assert_eq!(allocator.allocations.borrow().len(), 1);
}

#[test]
fn round_trip_reuses_storage_without_growth() {
    let allocator = TrackingAllocator::default();
    let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

    let first_round = iter::repeat_with(|| pool.acquire().unwrap())
        .take(50)
        .collect::<Vec<_>>();
    let slabs_after_first_round = allocator.allocations.borrow().len();

    for item in &first_round {
        // SAFETY: Came from this pool, released once.
        unsafe {
            pool.release(*item);
        }
    }

    let second_round = iter::repeat_with(|| pool.acquire().unwrap())
        .take(50)
        .collect::<HashSet<_>>();

    assert_eq!(
        allocator.allocations.borrow().len(),
        slabs_after_first_round
    );
    assert_eq!(second_round.len(), 50);
    assert_eq!(
        second_round,
        first_round.into_iter().collect::<HashSet<_>>()
    );
}

#[test]
fn slab_sizes_are_non_decreasing_and_follow_acquisitions() {
    let allocator = TrackingAllocator::default();
    let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

    let mut expected = Vec::new();

    for _ in 0..1000 {
        if pool.capacity() == pool.acquired_count() {
            expected.push(pool.acquired_count().max(8));
        }

        _ = pool.acquire().unwrap();
    }

    let actual = allocator.slab_item_counts();

    assert_eq!(actual, expected);
    assert!(actual.is_sorted());
}

#[test]
fn with_capacity_then_destroy_releases_one_slab() {
    let allocator = TrackingAllocator::default();

    let mut pool = FixedPool::<Item>::builder()
        .initial_capacity(nz!(16))
        .allocator(&allocator)
        .build()
        .unwrap();

    assert_eq!(allocator.live_blocks(), 1);

    pool.destroy();

    assert_eq!(allocator.releases.get(), 1);
    assert_eq!(allocator.live_blocks(), 0);
    assert_eq!(pool.slab_count(), 0);
}

#[test]
fn drop_releases_every_slab() {
    let allocator = TrackingAllocator::default();

    {
        let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

        for _ in 0..100 {
            _ = pool.acquire().unwrap();
        }

        assert_eq!(pool.allocator().live_blocks(), pool.slab_count());
    }

    assert_eq!(allocator.live_blocks(), 0);
    assert_eq!(
        allocator.releases.get(),
        allocator.allocations.borrow().len()
    );
}

#[test]
fn destroy_then_drop_does_not_double_release() {
    let allocator = TrackingAllocator::default();

    {
        let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);
        _ = pool.acquire().unwrap();
        pool.destroy();
    }

    assert_eq!(allocator.releases.get(), 1);
    assert_eq!(allocator.live_blocks(), 0);
}

#[test]
fn initial_capacity_failure_leaks_nothing() {
    let allocator = TrackingAllocator::default();
    allocator.exhausted.set(true);

    let result = FixedPool::<Item>::builder()
        .initial_capacity(nz!(10))
        .allocator(&allocator)
        .build();

    let Err(Error::AllocationFailure { size, align }) = result else {
        panic!("expected allocation failure");
    };

    assert_eq!(size, 10 * size_of::<Item>());
    assert_eq!(align, align_of::<Item>());
    assert_eq!(allocator.live_blocks(), 0);
    assert_eq!(allocator.releases.get(), 0);
}

#[test]
fn growth_failure_leaves_pool_intact() {
    let allocator = TrackingAllocator::default();
    let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

    let items = iter::repeat_with(|| pool.acquire().unwrap())
        .take(8)
        .collect::<Vec<_>>();

    allocator.exhausted.set(true);

    assert!(matches!(pool.acquire(), Err(Error::AllocationFailure { .. })));

    // Nothing changed: same slabs, same counter.
    assert_eq!(pool.slab_count(), 1);
    assert_eq!(pool.acquired_count(), 8);

    // Released items can still be reused without the allocator.
    let reused = *items.first().unwrap();

    // SAFETY: Came from this pool, released once.
    unsafe {
        pool.release(reused);
    }

    assert_eq!(pool.acquire().unwrap(), reused);

    // Once memory is available again, the pool grows as usual.
    allocator.exhausted.set(false);

    _ = pool.acquire().unwrap();
    assert_eq!(allocator.slab_item_counts(), [8, 9]);
}

#[test]
fn cumulative_acquisitions_drive_growth_under_churn() {
    let allocator = TrackingAllocator::default();
    let mut pool = FixedPool::<Item, _>::with_allocator(&allocator);

    // Keep one item live while churning through many short-lived ones.
    let _held = pool.acquire().unwrap();

    for _ in 0..99 {
        let item = pool.acquire().unwrap();

        // SAFETY: Came from this pool, released once.
        unsafe {
            pool.release(item);
        }
    }

    assert_eq!(pool.acquired_count(), 100);
    assert_eq!(allocator.slab_item_counts(), [8]);

    // Exhaust the first slab: the next slab is sized after all 100+ acquisitions, not after
    // the handful of items that were ever live at once.
    let _rest = iter::repeat_with(|| pool.acquire().unwrap())
        .take(7)
        .collect::<Vec<_>>();
    _ = pool.acquire().unwrap();

    assert_eq!(allocator.slab_item_counts(), [8, 107]);
}
