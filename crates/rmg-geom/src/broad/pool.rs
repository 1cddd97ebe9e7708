//! Typed slot arena used for tree nodes and cached pairs.
//!
//! Recycled slots are tracked with a free list of indices rather than C's
//! free-list-through-a-union trick, since Rust has no portable way to
//! reinterpret a live struct's storage as a linked-list pointer once it has
//! been dropped. The cost is one `Vec<u32>` of slack; the benefit is that
//! every live slot is an ordinary, safely typed value.

#[cfg(feature = "telemetry")]
use tracing::trace;

#[derive(Debug)]
enum Slot<R> {
    Occupied(R),
    Free,
}

/// A `Vec`-backed arena of `R` values addressed by stable `u32` indices.
///
/// Indices are stable across `obtain`/`recycle` cycles as long as the slot
/// isn't recycled: recycling a slot invalidates any index pointing at it,
/// but does not move or invalidate any other live slot's index.
#[derive(Debug)]
pub struct Pool<R> {
    slots: Vec<Slot<R>>,
    free: Vec<u32>,
}

impl<R> Pool<R> {
    /// Creates an empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new() }
    }

    /// Creates an empty pool with room for `capacity` slots before the
    /// first reallocation.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { slots: Vec::with_capacity(capacity), free: Vec::new() }
    }

    /// Number of live (occupied) slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns `true` if no slots are occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `value`, reusing a recycled slot when one is available, and
    /// returns its index.
    pub fn obtain(&mut self, value: R) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Slot::Occupied(value);
            return index;
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot::Occupied(value));

        #[cfg(feature = "telemetry")]
        if self.slots.len().is_power_of_two() {
            trace!(slots = self.slots.len(), "pool grew");
        }

        index
    }

    /// Removes and returns the value at `index`, marking the slot free for
    /// reuse by a later `obtain`.
    ///
    /// # Panics
    /// Panics (debug builds) if `index` does not address a currently
    /// occupied slot — recycling a free or out-of-range index is always a
    /// caller bug.
    pub fn recycle(&mut self, index: u32) -> R {
        let slot = std::mem::replace(&mut self.slots[index as usize], Slot::Free);
        self.free.push(index);
        match slot {
            Slot::Occupied(value) => value,
            Slot::Free => unreachable!("double recycle of pool slot {index}"),
        }
    }

    /// Borrows the value at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> &R {
        match &self.slots[index as usize] {
            Slot::Occupied(value) => value,
            Slot::Free => unreachable!("access to recycled pool slot {index}"),
        }
    }

    /// Mutably borrows the value at `index`.
    #[must_use]
    pub fn get_mut(&mut self, index: u32) -> &mut R {
        match &mut self.slots[index as usize] {
            Slot::Occupied(value) => value,
            Slot::Free => unreachable!("access to recycled pool slot {index}"),
        }
    }

    /// Drops every occupied slot and clears the free list, keeping the
    /// underlying allocation for reuse.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

impl<R> Default for Pool<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Pool;

    #[test]
    fn recycled_slots_are_reused_before_growing() {
        let mut pool: Pool<u32> = Pool::new();
        let a = pool.obtain(1);
        let b = pool.obtain(2);
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.recycle(a), 1);
        assert_eq!(pool.len(), 1);

        let c = pool.obtain(3);
        assert_eq!(c, a, "recycled slot should be reused");
        assert_eq!(*pool.get(c), 3);
        assert_eq!(*pool.get(b), 2);
    }

    #[test]
    fn clear_drops_everything() {
        let mut pool: Pool<String> = Pool::new();
        pool.obtain("hello".to_string());
        pool.obtain("world".to_string());
        pool.clear();
        assert!(pool.is_empty());
    }
}
