use super::ring::INITIAL_CAPACITY;

/// A free list of boxed parameter blocks.
///
/// Blocks handed out by [`acquire`](BufferPool::acquire) are owned by the
/// caller until given back through [`release`](BufferPool::release), so a
/// block can never sit in the free list while a task still holds it.
pub(crate) struct BufferPool<P> {
    free: Vec<Box<P>>,
    capacity: usize,
}

impl<P: Default> BufferPool<P> {
    pub(crate) fn new() -> Self {
        Self {
            free: Vec::with_capacity(INITIAL_CAPACITY),
            capacity: INITIAL_CAPACITY,
        }
    }

    /// Pops the most recently released block, or allocates a fresh one on a
    /// miss.
    pub(crate) fn acquire(&mut self) -> Box<P> {
        self.free.pop().unwrap_or_default()
    }

    /// Returns a block to the free list.
    pub(crate) fn release(&mut self, block: Box<P>) {
        if self.free.len() == self.capacity {
            self.grow(self.capacity * 2);
        }
        self.free.push(block);
    }

    /// Drops every cached block along with the free list itself.
    pub(crate) fn destroy(&mut self) {
        self.free = Vec::new();
        self.capacity = 0;
    }

    pub(crate) fn free_len(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    fn grow(&mut self, required: usize) {
        let mut capacity = self.capacity.max(1);
        while capacity < required {
            capacity *= 2;
        }
        self.free.reserve_exact(capacity - self.free.len());
        self.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_allocates_default_block() {
        let mut pool: BufferPool<[u8; 32]> = BufferPool::new();
        let block = pool.acquire();
        assert_eq!(*block, [0u8; 32]);
        assert_eq!(pool.free_len(), 0);
    }

    #[test]
    fn reuses_most_recently_released() {
        let mut pool: BufferPool<u64> = BufferPool::new();
        let mut a = pool.acquire();
        let mut b = pool.acquire();
        *a = 1;
        *b = 2;
        let b_addr = &*b as *const u64;
        pool.release(a);
        pool.release(b);

        let again = pool.acquire();
        assert_eq!(&*again as *const u64, b_addr);
        assert_eq!(*again, 2);
        assert_eq!(pool.free_len(), 1);
    }

    #[test]
    fn outstanding_blocks_are_distinct() {
        let mut pool: BufferPool<u64> = BufferPool::new();
        pool.release(Box::new(7));
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(&*a as *const u64, &*b as *const u64);
    }

    #[test]
    fn free_list_grows_by_doubling() {
        let mut pool: BufferPool<u8> = BufferPool::new();
        for _ in 0..INITIAL_CAPACITY + 1 {
            pool.release(Box::new(0));
        }
        assert_eq!(pool.capacity(), INITIAL_CAPACITY * 2);
        assert_eq!(pool.free_len(), INITIAL_CAPACITY + 1);
    }

    #[test]
    fn destroy_empties_and_recovers() {
        let mut pool: BufferPool<u8> = BufferPool::new();
        pool.release(Box::new(1));
        pool.destroy();
        assert_eq!(pool.free_len(), 0);
        assert_eq!(pool.capacity(), 0);
        pool.release(Box::new(2));
        assert_eq!(pool.free_len(), 1);
        assert_eq!(*pool.acquire(), 2);
    }
}
