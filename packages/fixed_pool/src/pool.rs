use std::any::type_name;
use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;

use new_zealand::nz;
use tracing::{debug, trace};

use crate::{Error, FixedPoolBuilder, FreeList, Result, Slab, SlabAllocator, SystemAllocator};

/// Every slab allocated on demand holds at least this many items, so small pools do not grow
/// one item at a time.
const MIN_SLAB_CAPACITY: NonZero<usize> = nz!(8);

/// A pool of fixed-size item storage for values of type `T`, carved out of slabs obtained from a
/// [`SlabAllocator`].
///
/// The pool hands out storage for one `T` at a time via [`acquire()`][1] and takes it back via
/// [`release()`][2]. Both are O(1): free items form an intrusive singly-linked list threaded
/// through their own storage, so the pool keeps no per-item bookkeeping at all. When no free item
/// remains, the pool allocates a new slab sized after the number of items acquired so far (at
/// least 8), which makes acquisition amortized O(1) even when the required capacity is not
/// known in advance.
///
/// # Item storage
///
/// The pool deals in storage, not values. An acquired item is uninitialized from the caller's
/// point of view and the pool never reads, writes or drops it until it is released. Use
/// [`insert()`][3] and [`remove()`][4] if you want the pool to move a value in and drop it
/// on the way out.
///
/// Item addresses are stable: storage is never moved, and it is only returned to the allocator
/// when the whole pool is [destroyed][5] or dropped. Released storage is reused for later
/// acquisitions, most recently released first.
///
/// `T` must be at least as large and at least as aligned as a pointer, because free items hold
/// the free list link in their own storage. Pools of smaller types fail to compile:
///
/// ```compile_fail
/// use fixed_pool::FixedPool;
///
/// // A u32 cannot hold a pointer-sized link.
/// let mut pool = FixedPool::<u32>::new();
/// _ = pool.acquire();
/// ```
///
/// Neither do pools of types that are large enough but less aligned than a pointer:
///
/// ```compile_fail
/// use fixed_pool::FixedPool;
///
/// let mut pool = FixedPool::<[u8; 16]>::new();
/// _ = pool.acquire();
/// ```
///
/// # Trust
///
/// The pool does not track which items are allocated and which are free. Releasing an item twice
/// or releasing a pointer that did not come from this pool corrupts the free list, which is why
/// [`release()`][2] is `unsafe`. In debug builds, [`integrity_check()`][6] can be used to
/// validate the free list on demand.
///
/// # Thread safety
///
/// The pool is not synchronized. It can be moved to another thread if `T` and the allocator
/// can, but it cannot be shared between threads. Use one pool per thread or wrap the pool in a
/// mutex.
///
/// # Examples
///
/// ```
/// use fixed_pool::FixedPool;
///
/// #[derive(Debug)]
/// struct Node {
///     value: u64,
///     next: Option<std::ptr::NonNull<Node>>,
/// }
///
/// let mut pool = FixedPool::<Node>::new();
///
/// let first = pool.insert(Node { value: 1, next: None })?;
/// let second = pool.insert(Node { value: 2, next: Some(first) })?;
///
/// // SAFETY: Both items were initialized by insert() and are still in the pool.
/// let (via_link, direct) = unsafe {
///     (
///         second.as_ref().next.unwrap().as_ref().value,
///         first.as_ref().value,
///     )
/// };
/// assert_eq!(via_link, direct);
///
/// // SAFETY: Both items came from this pool, hold initialized values and are removed once.
/// unsafe {
///     pool.remove(second);
///     pool.remove(first);
/// }
/// # Ok::<(), fixed_pool::Error>(())
/// ```
///
/// [1]: Self::acquire
/// [2]: Self::release
/// [3]: Self::insert
/// [4]: Self::remove
/// [5]: Self::destroy
/// [6]: Self::integrity_check
pub struct FixedPool<T, A: SlabAllocator = SystemAllocator> {
    /// Every slab the pool has allocated, in allocation order. Slabs are only released in bulk.
    slabs: Vec<Slab<T>>,

    /// Number of successful acquisitions over the lifetime of the pool (since construction or
    /// the last destroy). Never decremented on release: this sizes future slabs and is not a
    /// count of items currently in use, which the pool does not know.
    acquired_count: usize,

    free_list: FreeList<T>,

    allocator: A,
}

impl<T> FixedPool<T, SystemAllocator> {
    /// Creates an empty pool backed by the global allocator.
    ///
    /// No memory is allocated until the first item is acquired.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<u64>::new();
    ///
    /// assert_eq!(pool.capacity(), 0);
    /// assert_eq!(pool.slab_count(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_allocator(SystemAllocator)
    }

    /// Creates a pool backed by the global allocator with storage for `capacity` items allocated
    /// up front as a single slab.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the storage cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    /// use new_zealand::nz;
    ///
    /// let mut pool = FixedPool::<u64>::with_capacity(nz!(100))?;
    /// assert_eq!(pool.capacity(), 100);
    ///
    /// // Acquiring within the initial capacity does not allocate.
    /// for _ in 0..100 {
    ///     _ = pool.acquire()?;
    /// }
    /// assert_eq!(pool.slab_count(), 1);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn with_capacity(capacity: NonZero<usize>) -> Result<Self> {
        Self::builder().initial_capacity(capacity).build()
    }

    /// Starts building a new [`FixedPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    /// use new_zealand::nz;
    ///
    /// let pool = FixedPool::<u64>::builder().initial_capacity(nz!(16)).build()?;
    ///
    /// assert_eq!(pool.capacity(), 16);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn builder() -> FixedPoolBuilder<T, SystemAllocator> {
        FixedPoolBuilder::new()
    }
}

impl<T, A: SlabAllocator> FixedPool<T, A> {
    /// Creates an empty pool that obtains its slabs from `allocator`.
    ///
    /// No memory is allocated until the first item is acquired.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{FixedPool, SystemAllocator};
    ///
    /// let pool = FixedPool::<u64, _>::with_allocator(SystemAllocator);
    ///
    /// assert_eq!(pool.capacity(), 0);
    /// ```
    #[must_use]
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            slabs: Vec::new(),
            acquired_count: 0,
            free_list: FreeList::new(),
            allocator,
        }
    }

    /// Acquires storage for one item.
    ///
    /// The most recently released item is reused first. If there are no free items, a new slab
    /// of [`next_slab_capacity()`][1] items is allocated.
    ///
    /// The returned storage is uninitialized from the caller's point of view. It stays valid
    /// and does not move until it is [released][2] or the pool is destroyed or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if a new slab was needed and could not be allocated.
    /// The pool is unchanged in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new();
    ///
    /// let item = pool.acquire()?;
    ///
    /// // SAFETY: The storage is valid for writes of one u64 until released.
    /// unsafe {
    ///     item.write(42);
    /// }
    ///
    /// // SAFETY: The item came from this pool and is released once.
    /// unsafe {
    ///     pool.release(item);
    /// }
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    ///
    /// [1]: Self::next_slab_capacity
    /// [2]: Self::release
    pub fn acquire(&mut self) -> Result<NonNull<T>> {
        if self.free_list.is_empty() {
            self.add_slab(self.next_slab_capacity())?;
        }

        let item = self
            .free_list
            .pop()
            .expect("guarded by the slab we just added when the free list was empty");

        self.acquired_count = self
            .acquired_count
            .checked_add(1)
            .expect("every acquisition needs its own item slot, so this cannot exceed usize::MAX");

        Ok(item)
    }

    /// Returns an item's storage to the pool for reuse.
    ///
    /// The storage is not returned to the allocator and is the first to be handed out by the
    /// next [`acquire()`][1]. Any value in the storage is not dropped.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `item` was acquired from this pool, has not already been
    /// released and that the pool has not been destroyed since it was acquired. The caller must
    /// not access the storage after this call.
    ///
    /// [1]: Self::acquire
    pub unsafe fn release(&mut self, item: NonNull<T>) {
        // SAFETY: The caller guarantees the item is storage from one of our slabs that is not on
        // the free list and that nobody else uses any more. Our slabs live until destroy/drop,
        // which clears the free list.
        unsafe {
            self.free_list.push(item);
        }
    }

    /// Acquires storage for one item and moves `value` into it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if a new slab was needed and could not be allocated.
    /// The value is dropped in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<String>::new();
    ///
    /// let greeting = pool.insert("hello".to_string())?;
    ///
    /// // SAFETY: The item holds an initialized String and has not been removed.
    /// assert_eq!(unsafe { greeting.as_ref() }, "hello");
    ///
    /// // SAFETY: The item came from this pool, holds a String and is removed once.
    /// unsafe {
    ///     pool.remove(greeting);
    /// }
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn insert(&mut self, value: T) -> Result<NonNull<T>> {
        let item = self.acquire()?;

        // SAFETY: Freshly acquired storage is valid for writes of one T and exclusively ours.
        unsafe {
            item.write(value);
        }

        Ok(item)
    }

    /// Drops the value stored in an item and returns the item's storage to the pool.
    ///
    /// # Safety
    ///
    /// The caller must uphold the requirements of [`release()`][1] and must additionally ensure
    /// that the item holds an initialized `T` that nobody else references.
    ///
    /// [1]: Self::release
    pub unsafe fn remove(&mut self, item: NonNull<T>) {
        // SAFETY: The caller guarantees the item holds an initialized, unaliased T.
        unsafe {
            item.drop_in_place();
        }

        // SAFETY: Forwarding the caller's guarantees about the item's origin.
        unsafe {
            self.release(item);
        }
    }

    /// Releases every slab back to the allocator and returns the pool to its empty state.
    ///
    /// The pool remains usable afterwards and will allocate again when an item is acquired.
    /// Values in acquired items are not dropped. Any pointer to an item of this pool is dangling
    /// after this call, so the caller must have stopped using all items beforehand.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    /// use new_zealand::nz;
    ///
    /// let mut pool = FixedPool::<u64>::with_capacity(nz!(10))?;
    /// _ = pool.acquire()?;
    ///
    /// pool.destroy();
    ///
    /// assert_eq!(pool.capacity(), 0);
    /// assert_eq!(pool.acquired_count(), 0);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn destroy(&mut self) {
        let slab_count = self.slabs.len();

        self.release_slabs();

        // Release the slab index storage as well, not just its contents.
        self.slabs = Vec::new();
        self.acquired_count = 0;

        debug!(
            item_type = type_name::<T>(),
            slab_count, "released all slabs of pool"
        );
    }

    /// The total number of item slots across all slabs, whether free or acquired.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new();
    /// assert_eq!(pool.capacity(), 0);
    ///
    /// _ = pool.acquire()?;
    /// assert_eq!(pool.capacity(), 8);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slabs.iter().map(|slab| slab.capacity().get()).sum()
    }

    /// The number of slabs the pool has allocated.
    #[must_use]
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// The capacity of each slab, in the order the slabs were allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new();
    ///
    /// for _ in 0..20 {
    ///     _ = pool.acquire()?;
    /// }
    ///
    /// assert_eq!(pool.slab_capacities().collect::<Vec<_>>(), [8, 8, 16]);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn slab_capacities(&self) -> impl Iterator<Item = usize> {
        self.slabs.iter().map(|slab| slab.capacity().get())
    }

    /// The number of successful acquisitions since the pool was created or last destroyed.
    ///
    /// This is not the number of items currently in use: releasing an item does not decrease it.
    /// The pool uses it to size new slabs.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new();
    ///
    /// let item = pool.acquire()?;
    /// // SAFETY: The item came from this pool and is released once.
    /// unsafe {
    ///     pool.release(item);
    /// }
    ///
    /// assert_eq!(pool.acquired_count(), 1);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    #[must_use]
    pub fn acquired_count(&self) -> usize {
        self.acquired_count
    }

    /// The number of items the next slab will hold if the pool needs to grow now.
    ///
    /// This is the number of acquisitions so far, but never less than 8.
    #[must_use]
    pub fn next_slab_capacity(&self) -> NonZero<usize> {
        NonZero::new(self.acquired_count)
            .map_or(MIN_SLAB_CAPACITY, |count| count.max(MIN_SLAB_CAPACITY))
    }

    /// The allocator that the pool obtains its slabs from.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Allocates a slab of `capacity` items and pushes all of its items onto the free list.
    ///
    /// Space in the slab index is reserved before the slab is allocated, so a failure at either
    /// step leaves the pool exactly as it was.
    pub(crate) fn add_slab(&mut self, capacity: NonZero<usize>) -> Result<()> {
        self.slabs.try_reserve(1).map_err(|_reserve_error| {
            let requested = self.slabs.len().saturating_add(1);

            debug!(
                item_type = type_name::<T>(),
                requested, "failed to grow slab index of pool"
            );

            Error::AllocationFailure {
                size: size_of::<Slab<T>>().saturating_mul(requested),
                align: align_of::<Slab<T>>(),
            }
        })?;

        let slab = Slab::<T>::allocate(&self.allocator, capacity).inspect_err(|error| {
            debug!(
                item_type = type_name::<T>(),
                capacity = capacity.get(),
                %error,
                "failed to allocate slab for pool"
            );
        })?;

        // SAFETY: The slab storage was just allocated for `capacity` items, nobody else knows
        // about it and it lives until destroy/drop, which also clears the free list.
        unsafe {
            self.free_list
                .push_run(slab.first_item_ptr(), slab.capacity());
        }

        self.slabs.push(slab);

        trace!(
            item_type = type_name::<T>(),
            capacity = capacity.get(),
            slab_count = self.slabs.len(),
            "allocated slab for pool"
        );

        Ok(())
    }

    fn release_slabs(&mut self) {
        self.free_list.clear();

        for slab in self.slabs.drain(..) {
            // SAFETY: Every slab was allocated from our allocator and our caller (destroy or
            // drop) has ended the lifetime of all items.
            unsafe {
                slab.release(&self.allocator);
            }
        }
    }

    /// Validates the free list, panicking if it is corrupted.
    ///
    /// This walks every free item, so it is O(capacity). It is never called implicitly: acquire
    /// and release stay O(1) and unchecked, and this is an opt-in aid for debugging code that
    /// uses the pool. It can detect a free list that points outside the pool's slabs or between
    /// item boundaries and a free list that contains a cycle, which is what releasing an item
    /// twice in a row produces.
    ///
    /// Only available in builds with debug assertions enabled.
    ///
    /// # Panics
    ///
    /// Panics if the free list is corrupted.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new();
    /// let item = pool.acquire()?;
    ///
    /// # #[cfg(debug_assertions)]
    /// pool.integrity_check();
    ///
    /// // SAFETY: The item came from this pool and is released once.
    /// unsafe {
    ///     pool.release(item);
    /// }
    ///
    /// # #[cfg(debug_assertions)]
    /// pool.integrity_check();
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub fn integrity_check(&self) {
        let capacity = self.capacity();

        let terminated = self.free_list.walk(capacity, |item| {
            assert!(
                self.slabs.iter().any(|slab| slab.contains_item(item)),
                "free list of pool of {} links to {item:?}, which is not an item of this pool",
                type_name::<T>()
            );
        });

        assert!(
            terminated,
            "free list of pool of {} has more entries than the pool has capacity ({capacity}), \
             so it contains a cycle (was an item released twice?)",
            type_name::<T>()
        );
    }
}

impl<T> Default for FixedPool<T, SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: SlabAllocator> Drop for FixedPool<T, A> {
    fn drop(&mut self) {
        self.release_slabs();
    }
}

impl<T, A: SlabAllocator + fmt::Debug> fmt::Debug for FixedPool<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("slab_count", &self.slabs.len())
            .field("capacity", &self.capacity())
            .field("acquired_count", &self.acquired_count)
            .field("has_free_items", &!self.free_list.is_empty())
            .field("allocator", &self.allocator)
            .finish_non_exhaustive()
    }
}

// SAFETY: The raw pointers only refer to slab storage owned by the pool, so moving the pool moves
// that ownership along. Item storage may hold T values, so T must be Send, and the allocator
// moves along with the pool.
unsafe impl<T: Send, A: SlabAllocator + Send> Send for FixedPool<T, A> {}
