//! Fixed-capacity order arena
//!
//! Orders are stored in a pre-sized slot array and addressed by `u32`
//! handles; a freelist of released indices gives O(1) allocate/free with
//! no heap traffic during matching. Each slot carries the intrusive
//! `prev`/`next` links that price-level FIFOs thread through the arena,
//! which keeps the book free of pointer cycles.
//!
//! Exhaustion returns `None`; the book turns that into a REJECTED
//! submission.

use crate::order::Order;

/// Handle into the arena. `NIL` is the list terminator.
pub type OrderHandle = u32;

/// Null handle
pub const NIL: OrderHandle = u32::MAX;

#[derive(Debug, Clone)]
struct Slot {
    order: Order,
    prev: OrderHandle,
    next: OrderHandle,
}

/// Pre-sized pool of order slots with a freelist
#[derive(Debug)]
pub struct OrderArena {
    slots: Vec<Slot>,
    free: Vec<OrderHandle>,
    capacity: usize,
}

impl OrderArena {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "arena capacity must be positive");
        assert!(capacity < NIL as usize, "arena capacity exceeds handle range");
        Self {
            // Slot storage is reserved up front; slots are appended until
            // the reservation is consumed, then recycled via the freelist.
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
        }
    }

    /// Place an order into a slot. `None` when the pool is exhausted.
    pub fn alloc(&mut self, order: Order) -> Option<OrderHandle> {
        if let Some(handle) = self.free.pop() {
            let slot = &mut self.slots[handle as usize];
            slot.order = order;
            slot.prev = NIL;
            slot.next = NIL;
            return Some(handle);
        }
        if self.slots.len() < self.capacity {
            let handle = self.slots.len() as OrderHandle;
            self.slots.push(Slot {
                order,
                prev: NIL,
                next: NIL,
            });
            return Some(handle);
        }
        None
    }

    /// Release a slot back to the freelist
    pub fn free(&mut self, handle: OrderHandle) {
        debug_assert!((handle as usize) < self.slots.len());
        let slot = &mut self.slots[handle as usize];
        slot.prev = NIL;
        slot.next = NIL;
        self.free.push(handle);
    }

    #[inline]
    pub fn get(&self, handle: OrderHandle) -> &Order {
        &self.slots[handle as usize].order
    }

    #[inline]
    pub fn get_mut(&mut self, handle: OrderHandle) -> &mut Order {
        &mut self.slots[handle as usize].order
    }

    #[inline]
    pub fn prev_of(&self, handle: OrderHandle) -> OrderHandle {
        self.slots[handle as usize].prev
    }

    #[inline]
    pub fn next_of(&self, handle: OrderHandle) -> OrderHandle {
        self.slots[handle as usize].next
    }

    #[inline]
    pub fn set_prev(&mut self, handle: OrderHandle, prev: OrderHandle) {
        self.slots[handle as usize].prev = prev;
    }

    #[inline]
    pub fn set_next(&mut self, handle: OrderHandle, next: OrderHandle) {
        self.slots[handle as usize].next = next;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn allocated(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.allocated()
    }

    /// Drop every live slot (book clear)
    pub fn reset(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
