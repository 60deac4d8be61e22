#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A pool of fixed-size item storage with O(1) acquire and release.
//!
//! This crate provides [`FixedPool`], a specialized allocator for programs that repeatedly
//! create and destroy many objects of one type (graph nodes, list cells, connection records and
//! similar). Compared to a general-purpose allocator it offers cheaper operations, better
//! spatial locality and less fragmentation.
//!
//! # Key Features
//!
//! - **O(1) operations**: acquiring and releasing an item is a pop or push on a free list;
//!   growing the pool is amortized O(1) because slab sizes follow the number of acquisitions.
//! - **Zero per-item overhead**: free items store the free list link in their own storage.
//! - **Stable addresses**: item storage never moves and is only returned to the allocator when
//!   the whole pool is destroyed.
//! - **Pluggable allocation**: slabs come from a [`SlabAllocator`], defaulting to the global
//!   allocator via [`SystemAllocator`], and allocation failure is reported as
//!   [`Error::AllocationFailure`] instead of aborting.
//!
//! The pool trusts its caller: it does not track which items are in use, so releasing an item
//! twice or releasing a foreign pointer is undefined behavior. In debug builds,
//! [`FixedPool::integrity_check()`] validates the free list on demand.
//!
//! # Examples
//!
//! ```rust
//! use fixed_pool::FixedPool;
//!
//! let mut pool = FixedPool::<u64>::new();
//!
//! let item = pool.acquire()?;
//!
//! // SAFETY: Acquired storage is valid for one u64 until it is released.
//! unsafe {
//!     item.write(1234);
//! }
//!
//! // SAFETY: We just initialized the item above.
//! let value = unsafe { item.read() };
//! assert_eq!(value, 1234);
//!
//! // SAFETY: The item came from this pool and is released exactly once.
//! unsafe {
//!     pool.release(item);
//! }
//!
//! // Released storage is reused before the pool grows.
//! let again = pool.acquire()?;
//! assert_eq!(again, item);
//! assert_eq!(pool.slab_count(), 1);
//! # Ok::<(), fixed_pool::Error>(())
//! ```
//!
//! ## Pre-sizing the pool
//!
//! ```rust
//! use fixed_pool::FixedPool;
//! use new_zealand::nz;
//!
//! // One slab with room for 1000 items is allocated up front.
//! let mut pool = FixedPool::<[u64; 8]>::with_capacity(nz!(1000))?;
//!
//! for _ in 0..1000 {
//!     _ = pool.acquire()?;
//! }
//!
//! assert_eq!(pool.slab_count(), 1);
//! # Ok::<(), fixed_pool::Error>(())
//! ```

mod allocator;
mod builder;
mod error;
mod free_list;
mod pool;
mod slab;

pub use allocator::*;
pub use builder::*;
pub use error::*;
pub(crate) use free_list::*;
pub use pool::FixedPool;
pub(crate) use slab::*;
