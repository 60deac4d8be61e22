//! Using a `FixedPool` as the node allocator of a singly-linked stack:
//!
//! * Creating a pool.
//! * Allocating nodes by inserting values.
//! * Freeing nodes and observing that their storage is reused.
//! * Watching the pool grow as more nodes are needed.

use std::ptr::NonNull;

use fixed_pool::FixedPool;

struct Node {
    value: u32,
    next: Option<NonNull<Node>>,
}

/// A stack whose nodes live in a pool instead of individual heap allocations.
struct Stack {
    pool: FixedPool<Node>,
    head: Option<NonNull<Node>>,
}

impl Stack {
    fn new() -> Self {
        Self {
            pool: FixedPool::new(),
            head: None,
        }
    }

    fn push(&mut self, value: u32) -> Result<(), fixed_pool::Error> {
        let node = self.pool.insert(Node {
            value,
            next: self.head,
        })?;

        self.head = Some(node);
        Ok(())
    }

    fn pop(&mut self) -> Option<u32> {
        let node = self.head?;

        // SAFETY: Every node on the stack holds an initialized Node and we remove it only once,
        // after reading what we need from it.
        let (value, next) = unsafe {
            let node_ref = node.as_ref();
            (node_ref.value, node_ref.next)
        };

        self.head = next;

        // SAFETY: The node came from our pool, holds an initialized value and is no longer
        // reachable from the stack.
        unsafe {
            self.pool.remove(node);
        }

        Some(value)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

fn main() -> Result<(), fixed_pool::Error> {
    let mut stack = Stack::new();

    for value in 0..5 {
        stack.push(value)?;
    }

    println!(
        "Pushed 5 nodes into {} slab(s) with room for {} nodes",
        stack.pool.slab_count(),
        stack.pool.capacity()
    );

    let top = stack.head;
    let popped = stack.pop();
    println!("Popped {popped:?}");

    // The freed node is the first to be reused.
    stack.push(100)?;
    println!("Reused the popped node's storage: {}", stack.head == top);

    for value in 0..100 {
        stack.push(value)?;
    }

    println!(
        "After {} acquisitions the pool has slabs of sizes {:?}",
        stack.pool.acquired_count(),
        stack.pool.slab_capacities().collect::<Vec<_>>()
    );

    Ok(())
}
