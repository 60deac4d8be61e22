use std::num::NonZero;
use std::ptr::NonNull;

/// The "next" link that a free item stores inside its own storage. `None` terminates the list.
type Link<T> = Option<NonNull<T>>;

/// Intrusive singly-linked list of free items, threaded through the storage of the items.
///
/// This is the only place where item storage is reinterpreted as a [`Link`]. While an item is on
/// the list, its first pointer-sized bytes hold the link to the next free item. Once popped, the
/// storage belongs to the caller and we never touch it again until it is pushed back.
///
/// The list itself never allocates: it only reads and writes links in storage that its owner
/// guarantees to be valid (see the safety requirements of [`push()`][Self::push] and
/// [`push_run()`][Self::push_run]).
#[derive(Debug)]
pub(crate) struct FreeList<T> {
    head: Link<T>,
}

impl<T> FreeList<T> {
    /// Creates an empty free list.
    ///
    /// Fails to compile if `T` cannot host a [`Link`] in its own storage.
    #[must_use]
    pub(crate) const fn new() -> Self {
        const {
            assert!(
                size_of::<T>() >= size_of::<Link<T>>(),
                "pool items must be at least as large as a pointer"
            );
            assert!(
                align_of::<T>() >= align_of::<Link<T>>(),
                "pool items must be at least as aligned as a pointer"
            );
        }

        Self { head: None }
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Removes the most recently pushed item from the list, if any.
    ///
    /// The returned storage is no longer tracked by the list. Its content is unspecified.
    #[must_use]
    pub(crate) fn pop(&mut self) -> Option<NonNull<T>> {
        let item = self.head?;

        // SAFETY: Every item reachable from the head is valid, aligned storage holding a link,
        // as required by `push()` and `push_run()`. Alignment is guaranteed by `new()`.
        self.head = unsafe { item.cast::<Link<T>>().read() };

        Some(item)
    }

    /// Pushes one item onto the head of the list.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `item` points to storage for a `T` that remains valid for as
    /// long as it is on the list, that the storage is not used by anyone else while it is on the
    /// list and that the item is not already on the list.
    pub(crate) unsafe fn push(&mut self, item: NonNull<T>) {
        // SAFETY: The caller guarantees the storage is valid and exclusively ours. `new()`
        // guarantees a link fits in it with correct alignment.
        unsafe {
            item.cast::<Link<T>>().write(self.head);
        }

        self.head = Some(item);
    }

    /// Links `count` contiguous items starting at `first` into a chain and pushes the chain onto
    /// the head of the list, so `first` is the next item to be popped.
    ///
    /// On an empty list, the last item of the run receives the terminator.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `first` points to storage for `count` contiguous `T` values
    /// that remains valid for as long as any of them is on the list, that none of these items is
    /// already on the list and that nobody else uses the storage while it is on the list.
    pub(crate) unsafe fn push_run(&mut self, first: NonNull<T>, count: NonZero<usize>) {
        let last_index = count
            .get()
            .checked_sub(1)
            .expect("guarded by NonZero count");

        for index in 0..last_index {
            // SAFETY: The caller guarantees `count` contiguous items and index < count - 1.
            let item = unsafe { first.add(index) };

            // SAFETY: index + 1 <= count - 1, so the next item is also inside the run.
            let next = unsafe { item.add(1) };

            // SAFETY: The storage is valid and exclusively ours per the caller's guarantee and
            // `new()` guarantees a link fits in it with correct alignment.
            unsafe {
                item.cast::<Link<T>>().write(Some(next));
            }
        }

        // SAFETY: last_index < count, so the item is inside the run.
        let last = unsafe { first.add(last_index) };

        // SAFETY: As above, the storage is valid, exclusively ours and can hold a link.
        unsafe {
            last.cast::<Link<T>>().write(self.head);
        }

        self.head = Some(first);
    }

    /// Forgets every item on the list without touching their storage.
    ///
    /// Used when the storage behind the list is about to be released.
    pub(crate) fn clear(&mut self) {
        self.head = None;
    }

    /// Walks the list from the head, calling `visit` with every free item in order.
    ///
    /// Stops early (returning `false`) after `limit` items, which lets callers detect a cycle
    /// without remembering every visited address. Returns `true` if the terminator was reached.
    #[cfg(debug_assertions)]
    pub(crate) fn walk(&self, limit: usize, mut visit: impl FnMut(NonNull<T>)) -> bool {
        let mut current = self.head;
        let mut visited: usize = 0;

        while let Some(item) = current {
            if visited == limit {
                return false;
            }

            visit(item);

            visited = visited
                .checked_add(1)
                .expect("guarded by the limit check above");

            // SAFETY: Items reachable from the head are valid storage holding a link. The caller
            // validates the address in `visit` before we get here, so a corrupt link panics
            // there rather than being dereferenced.
            current = unsafe { item.cast::<Link<T>>().read() };
        }

        true
    }
}
