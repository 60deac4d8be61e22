use std::alloc::Layout;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::{Error, Result, SlabAllocator};

/// One contiguous block of storage for `capacity` items of type `T`, obtained from a
/// [`SlabAllocator`] as a single allocation.
///
/// The slab does not release its storage on drop because it does not own the allocator that
/// issued it. Its owner must call [`release()`][Self::release] exactly once, with the same
/// allocator, before forgetting it.
///
/// The slab never reads or writes the storage it points to. Linking the items into a free list
/// is the owner's business.
#[derive(Debug)]
pub(crate) struct Slab<T> {
    first_item_ptr: NonNull<T>,

    capacity: NonZero<usize>,
}

impl<T> Slab<T> {
    /// Allocates uninitialized storage for `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the layout would overflow `isize::MAX` bytes or if
    /// the allocator cannot satisfy the request.
    pub(crate) fn allocate<A: SlabAllocator>(
        allocator: &A,
        capacity: NonZero<usize>,
    ) -> Result<Self> {
        let layout = Self::layout(capacity)?;

        let first_item_ptr = allocator.allocate_contiguous(layout)?.cast::<T>();

        Ok(Self {
            first_item_ptr,
            capacity,
        })
    }

    fn layout(capacity: NonZero<usize>) -> Result<Layout> {
        Layout::array::<T>(capacity.get()).map_err(|_layout_error| Error::AllocationFailure {
            size: size_of::<T>().saturating_mul(capacity.get()),
            align: align_of::<T>(),
        })
    }

    #[must_use]
    pub(crate) fn first_item_ptr(&self) -> NonNull<T> {
        self.first_item_ptr
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// Whether `item` is the start of one of the item slots in this slab.
    #[cfg(debug_assertions)]
    #[must_use]
    pub(crate) fn contains_item(&self, item: NonNull<T>) -> bool {
        let start = self.first_item_ptr.addr().get();
        let address = item.addr().get();

        let Some(offset) = address.checked_sub(start) else {
            return false;
        };

        // A slab layout is valid by construction, so this cannot overflow.
        let size_in_bytes = size_of::<T>().wrapping_mul(self.capacity.get());

        let at_item_boundary = offset.checked_rem(size_of::<T>()) == Some(0);

        offset < size_in_bytes && at_item_boundary
    }

    /// Returns the storage to the allocator that issued it.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `allocator` is the allocator (or a handle to the same
    /// allocator) that this slab was allocated from and that no item in the slab is used after
    /// this call.
    pub(crate) unsafe fn release<A: SlabAllocator>(self, allocator: &A) {
        let layout = Self::layout(self.capacity)
            .expect("layout was already validated when the slab was allocated");

        // SAFETY: The caller guarantees this is the issuing allocator and the layout matches the
        // one we allocated with because it is derived from the same capacity.
        unsafe {
            allocator.release_block(self.first_item_ptr.cast(), layout);
        }
    }
}
