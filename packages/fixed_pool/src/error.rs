use std::alloc::Layout;
use std::result::Result as StdResult;

use thiserror::Error;

/// Errors that can occur when a [`FixedPool`][crate::FixedPool] needs more storage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The allocation collaborator could not provide a block of the requested layout.
    ///
    /// The pool is left unchanged when this is returned: existing slabs and free items remain
    /// valid and a later request may succeed if memory becomes available.
    #[error("failed to allocate {size} bytes with alignment {align}")]
    AllocationFailure {
        /// Size in bytes of the block that could not be allocated.
        size: usize,

        /// Alignment in bytes of the block that could not be allocated.
        align: usize,
    },
}

impl Error {
    /// Creates an [`Error::AllocationFailure`] describing a failed request for `layout`.
    ///
    /// Intended for [`SlabAllocator`][crate::SlabAllocator] implementations to report exhaustion.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::alloc::Layout;
    ///
    /// use fixed_pool::Error;
    ///
    /// let error = Error::allocation_failure(Layout::new::<u64>());
    /// assert_eq!(
    ///     error.to_string(),
    ///     "failed to allocate 8 bytes with alignment 8"
    /// );
    /// ```
    #[must_use]
    pub fn allocation_failure(layout: Layout) -> Self {
        Self::AllocationFailure {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = StdResult<T, Error>;
