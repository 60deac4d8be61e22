use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;

use crate::{Error, Result};

/// Supplies and reclaims the contiguous blocks that a [`FixedPool`][crate::FixedPool] carves
/// into slabs of items.
///
/// The pool only ever asks for one thing ("allocate storage for N contiguous items, or report
/// failure") and later hands each block back exactly once, with the same layout, when the pool
/// is destroyed or dropped.
///
/// # Safety
///
/// Implementations must return from [`allocate_contiguous()`][Self::allocate_contiguous] either
/// an error or a pointer to a block that is valid for reads and writes of `layout.size()` bytes,
/// aligned to `layout.align()`, and not aliased by any other live allocation. The block must
/// remain valid until it is passed to [`release_block()`][Self::release_block]. Returning a
/// usable-looking block of the wrong size or alignment is undefined behavior in the pool.
///
/// # Examples
///
/// ```
/// use std::alloc::Layout;
/// use std::cell::Cell;
/// use std::ptr::NonNull;
///
/// use fixed_pool::{FixedPool, Result, SlabAllocator, SystemAllocator};
///
/// #[derive(Debug, Default)]
/// struct CountingAllocator {
///     live_blocks: Cell<usize>,
/// }
///
/// // SAFETY: We forward to the system allocator, which upholds the contract.
/// unsafe impl SlabAllocator for CountingAllocator {
///     fn allocate_contiguous(&self, layout: Layout) -> Result<NonNull<u8>> {
///         let block = SystemAllocator.allocate_contiguous(layout)?;
///         self.live_blocks.set(self.live_blocks.get() + 1);
///         Ok(block)
///     }
///
///     unsafe fn release_block(&self, block: NonNull<u8>, layout: Layout) {
///         self.live_blocks.set(self.live_blocks.get() - 1);
///         // SAFETY: Forwarding the caller's guarantee to the allocator that issued the block.
///         unsafe {
///             SystemAllocator.release_block(block, layout);
///         }
///     }
/// }
///
/// let allocator = CountingAllocator::default();
///
/// {
///     let mut pool = FixedPool::<u64, _>::with_allocator(&allocator);
///     let _item = pool.acquire()?;
///     assert_eq!(allocator.live_blocks.get(), 1);
/// }
///
/// assert_eq!(allocator.live_blocks.get(), 0);
/// # Ok::<(), fixed_pool::Error>(())
/// ```
pub unsafe trait SlabAllocator {
    /// Allocates uninitialized storage fitting `layout`, which always has a non-zero size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the request cannot be satisfied.
    fn allocate_contiguous(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Releases a block previously returned by [`allocate_contiguous()`][Self::allocate_contiguous].
    ///
    /// # Safety
    ///
    /// The caller must ensure that `block` was returned by `allocate_contiguous()` on this same
    /// allocator with the same `layout`, and that it has not already been released.
    unsafe fn release_block(&self, block: NonNull<u8>, layout: Layout);
}

// SAFETY: We forward to the referenced allocator, which upholds the contract.
unsafe impl<A: SlabAllocator + ?Sized> SlabAllocator for &A {
    fn allocate_contiguous(&self, layout: Layout) -> Result<NonNull<u8>> {
        (**self).allocate_contiguous(layout)
    }

    unsafe fn release_block(&self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the caller's guarantee to the same underlying allocator.
        unsafe {
            (**self).release_block(block, layout);
        }
    }
}

/// The default [`SlabAllocator`], backed by the Rust global allocator.
///
/// Unlike most collections in the standard library, a pool using this allocator reports
/// allocator exhaustion as [`Error::AllocationFailure`] instead of aborting the process.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_structs,
    reason = "stateless unit struct that callers construct by name"
)]
pub struct SystemAllocator;

// SAFETY: The global allocator hands out blocks matching the requested layout or null, and we
// turn null into an error.
unsafe impl SlabAllocator for SystemAllocator {
    fn allocate_contiguous(&self, layout: Layout) -> Result<NonNull<u8>> {
        assert!(
            layout.size() > 0,
            "slab layouts are never zero-sized because items must fit a pointer"
        );

        // SAFETY: The layout has a non-zero size, as asserted above.
        let ptr = unsafe { alloc(layout) };

        NonNull::new(ptr).ok_or_else(|| Error::allocation_failure(layout))
    }

    unsafe fn release_block(&self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: The caller guarantees the block came from `alloc()` with this layout.
        unsafe {
            dealloc(block.as_ptr(), layout);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SystemAllocator: Send, Sync, Copy);

    #[test]
    fn system_allocator_honors_alignment() {
        let layout = Layout::from_size_align(256, 64).unwrap();

        let block = SystemAllocator.allocate_contiguous(layout).unwrap();
        assert_eq!(block.addr().get() % 64, 0);

        // SAFETY: The block came from this allocator with this layout.
        unsafe {
            SystemAllocator.release_block(block, layout);
        }
    }

    #[test]
    fn system_allocator_block_is_writable() {
        let layout = Layout::array::<u64>(16).unwrap();

        let block = SystemAllocator.allocate_contiguous(layout).unwrap();
        let items = block.cast::<u64>();

        for index in 0..16_u64 {
            // SAFETY: The block holds 16 u64 values and index is within that range.
            let item = unsafe { items.add(usize::try_from(index).unwrap()) };

            // SAFETY: The storage is valid for writes and correctly aligned for u64.
            unsafe {
                item.write(index * 3);
            }
        }

        // SAFETY: The block holds 16 u64 values.
        let last = unsafe { items.add(15) };

        // SAFETY: The last item was initialized by the loop above.
        let last = unsafe { last.read() };
        assert_eq!(last, 45);

        // SAFETY: The block came from this allocator with this layout.
        unsafe {
            SystemAllocator.release_block(block, layout);
        }
    }

    #[test]
    #[should_panic]
    fn system_allocator_rejects_zero_sized_layout() {
        _ = SystemAllocator.allocate_contiguous(Layout::new::<()>());
    }

    #[test]
    fn shared_reference_forwards_to_allocator() {
        let allocator = SystemAllocator;
        let by_ref = &allocator;
        let layout = Layout::new::<usize>();

        let block = by_ref.allocate_contiguous(layout).unwrap();

        // SAFETY: The block came from the same underlying allocator with this layout.
        unsafe {
            by_ref.release_block(block, layout);
        }
    }
}
