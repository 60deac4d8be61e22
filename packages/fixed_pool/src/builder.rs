use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use crate::{FixedPool, Result, SlabAllocator, SystemAllocator};

/// Builder for creating an instance of [`FixedPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// [`FixedPool::new()`][1] and [`FixedPool::with_capacity()`][2] cover most use cases.
///
/// # Examples
///
/// ```
/// use fixed_pool::{FixedPool, SystemAllocator};
/// use new_zealand::nz;
///
/// let pool = FixedPool::<u64>::builder()
///     .initial_capacity(nz!(64))
///     .allocator(SystemAllocator)
///     .build()?;
///
/// assert_eq!(pool.capacity(), 64);
/// # Ok::<(), fixed_pool::Error>(())
/// ```
///
/// [1]: FixedPool::new
/// [2]: FixedPool::with_capacity
#[must_use]
pub struct FixedPoolBuilder<T, A = SystemAllocator> {
    initial_capacity: Option<NonZero<usize>>,

    allocator: A,

    _item: PhantomData<T>,
}

impl<T, A: fmt::Debug> fmt::Debug for FixedPoolBuilder<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("initial_capacity", &self.initial_capacity)
            .field("allocator", &self.allocator)
            .finish()
    }
}

impl<T> FixedPoolBuilder<T, SystemAllocator> {
    pub(crate) fn new() -> Self {
        Self {
            initial_capacity: None,
            allocator: SystemAllocator,
            _item: PhantomData,
        }
    }
}

impl<T, A: SlabAllocator> FixedPoolBuilder<T, A> {
    /// Sets the number of items to allocate eagerly, as a single slab, when the pool is built.
    ///
    /// By default, the pool is built empty and allocates nothing until the first item is
    /// acquired.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    /// use new_zealand::nz;
    ///
    /// let pool = FixedPool::<u64>::builder().initial_capacity(nz!(4)).build()?;
    ///
    /// assert_eq!(pool.slab_count(), 1);
    /// assert_eq!(pool.capacity(), 4);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn initial_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets the [`SlabAllocator`] that the pool obtains its slabs from.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{FixedPool, SystemAllocator};
    ///
    /// let shared = SystemAllocator;
    ///
    /// // Pools can borrow a shared allocator instead of owning one.
    /// let pool = FixedPool::<u64>::builder().allocator(&shared).build()?;
    /// assert_eq!(pool.capacity(), 0);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    #[allow(
        clippy::use_self,
        reason = "the returned builder has a different allocator type than Self"
    )]
    pub fn allocator<B: SlabAllocator>(self, allocator: B) -> FixedPoolBuilder<T, B> {
        FixedPoolBuilder {
            initial_capacity: self.initial_capacity,
            allocator,
            _item: PhantomData,
        }
    }

    /// Builds the pool with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if an initial
    /// capacity was requested and the allocator cannot provide it. Nothing is leaked when this
    /// happens.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<u64>::builder().build()?;
    ///
    /// assert_eq!(pool.capacity(), 0);
    /// # Ok::<(), fixed_pool::Error>(())
    /// ```
    pub fn build(self) -> Result<FixedPool<T, A>> {
        let mut pool = FixedPool::with_allocator(self.allocator);

        if let Some(capacity) = self.initial_capacity {
            pool.add_slab(capacity)?;
        }

        Ok(pool)
    }
}
