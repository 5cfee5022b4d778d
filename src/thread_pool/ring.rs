use std::mem;

/// Initial number of slots in a freshly allocated ring.
pub(crate) const INITIAL_CAPACITY: usize = 100;

/// A growable circular FIFO buffer.
///
/// Entries live in `slots[head..head + count]`, wrapping modulo the
/// capacity. Capacity only grows by doubling. The ring has no locking of
/// its own; the owning pool serializes access.
pub(crate) struct RingQueue<T> {
    slots: Vec<T>,
    head: usize,
    count: usize,
}

impl<T: Default> RingQueue<T> {
    /// Allocates a ring with the initial capacity.
    pub(crate) fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, T::default);
        Self {
            slots,
            head: 0,
            count: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Doubles the capacity until `required` entries fit.
    ///
    /// Entries that wrapped past the old end of the buffer are moved into
    /// the newly added tail so the logical sequence stays contiguous from
    /// `head`. Entries before the boundary are not touched.
    pub(crate) fn ensure_capacity(&mut self, required: usize) {
        let old_capacity = self.capacity();
        if required <= old_capacity {
            return;
        }

        let mut new_capacity = old_capacity.max(1);
        while new_capacity < required {
            new_capacity *= 2;
        }
        self.slots.resize_with(new_capacity, T::default);

        if old_capacity == 0 {
            self.head = 0;
            return;
        }

        let end = self.head + self.count;
        if end > old_capacity {
            let wrapped = end - old_capacity;
            for i in 0..wrapped {
                self.slots.swap(i, old_capacity + i);
            }
        }
    }

    /// Appends `item` at the back, growing the ring when it is full.
    pub(crate) fn push_back(&mut self, item: T) {
        if self.count == self.capacity() {
            self.ensure_capacity(self.count + 1);
        }
        let tail = (self.head + self.count) % self.capacity();
        self.slots[tail] = item;
        self.count += 1;
    }

    /// Removes the oldest entry.
    ///
    /// An empty ring yields `T::default()`, which callers treat as "no item".
    pub(crate) fn pop_front(&mut self) -> T {
        if self.count == 0 {
            return T::default();
        }
        let item = mem::take(&mut self.slots[self.head]);
        self.head = (self.head + 1) % self.capacity();
        self.count -= 1;
        item
    }

    /// Frees the backing storage. A later push reallocates.
    pub(crate) fn release(&mut self) {
        self.slots = Vec::new();
        self.head = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ring: &mut RingQueue<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        while !ring.is_empty() {
            out.push(ring.pop_front());
        }
        out
    }

    #[test]
    fn starts_with_initial_capacity() {
        let ring: RingQueue<u32> = RingQueue::new();
        assert_eq!(ring.capacity(), INITIAL_CAPACITY);
        assert!(ring.is_empty());
    }

    #[test]
    fn pop_on_empty_returns_default() {
        let mut ring: RingQueue<u32> = RingQueue::with_capacity(4);
        assert_eq!(ring.pop_front(), 0);
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn keeps_fifo_order_across_wrap() {
        let mut ring = RingQueue::with_capacity(4);
        for i in 1..=3 {
            ring.push_back(i);
        }
        assert_eq!(ring.pop_front(), 1);
        assert_eq!(ring.pop_front(), 2);
        for i in 4..=6 {
            ring.push_back(i);
        }
        assert_eq!(ring.capacity(), 4);
        assert_eq!(drain(&mut ring), vec![3, 4, 5, 6]);
    }

    #[test]
    fn growth_relocates_wrapped_segment() {
        let mut ring = RingQueue::with_capacity(4);
        for i in 1..=4 {
            ring.push_back(i);
        }
        ring.pop_front();
        ring.pop_front();
        ring.push_back(5);
        ring.push_back(6);
        // head = 2, entries 3 4 | 5 6 wrapped to the front
        ring.push_back(7);
        assert_eq!(ring.capacity(), 8);
        assert_eq!(ring.len(), 5);
        assert_eq!(drain(&mut ring), vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn growth_without_wrap_leaves_entries_in_place() {
        let mut ring = RingQueue::with_capacity(2);
        ring.push_back(10);
        ring.push_back(20);
        ring.ensure_capacity(5);
        assert_eq!(ring.capacity(), 8);
        ring.push_back(30);
        assert_eq!(drain(&mut ring), vec![10, 20, 30]);
    }

    #[test]
    fn ensure_capacity_never_shrinks() {
        let mut ring: RingQueue<u32> = RingQueue::with_capacity(16);
        ring.ensure_capacity(3);
        assert_eq!(ring.capacity(), 16);
    }

    #[test]
    fn push_after_release_reallocates() {
        let mut ring = RingQueue::with_capacity(4);
        ring.push_back(1);
        ring.release();
        assert_eq!(ring.capacity(), 0);
        ring.push_back(2);
        ring.push_back(3);
        assert_eq!(drain(&mut ring), vec![2, 3]);
    }

    #[test]
    fn interleaved_traffic_preserves_order() {
        let mut ring = RingQueue::with_capacity(3);
        let mut next_in = 0u32;
        let mut next_out = 0u32;
        for round in 0..50 {
            for _ in 0..(round % 5 + 1) {
                ring.push_back(next_in);
                next_in += 1;
            }
            for _ in 0..(round % 3) {
                if ring.is_empty() {
                    break;
                }
                assert_eq!(ring.pop_front(), next_out);
                next_out += 1;
            }
        }
        for value in drain(&mut ring) {
            assert_eq!(value, next_out);
            next_out += 1;
        }
        assert_eq!(next_in, next_out);
    }
}
