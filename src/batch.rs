use crate::PoolAllocator;

/// A bounded group of pooled objects that moves between caches as a unit.
///
/// `capacity` is fixed at creation; `len()` never exceeds it.
#[derive(Debug)]
pub(crate) struct Batch<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> Batch<T> {
    pub(crate) fn empty(capacity: usize) -> Self {
        Batch {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Appends an object. The caller only pushes into batches taken from the
    /// growing cache, which never hold a full batch.
    #[inline]
    pub(crate) fn push(&mut self, obj: T) {
        debug_assert!(!self.is_full(), "push into a full batch");
        self.items.push(obj);
    }
}

/// Creates the empty batches handed out by the growing cache.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EmptyBatch {
    pub(crate) capacity: usize,
}

impl<T> PoolAllocator<Batch<T>> for EmptyBatch {
    fn allocate(&self) -> Batch<T> {
        tracing::trace!(capacity = self.capacity, "allocating empty batch");
        Batch::empty(self.capacity)
    }
}

/// Creates the batches handed out by the ready cache, pre-filled with `fill`
/// objects from the user allocator.
#[derive(Debug)]
pub(crate) struct FilledBatch<P> {
    pub(crate) allocator: P,
    pub(crate) fill: usize,
    pub(crate) capacity: usize,
}

impl<P: PoolAllocator<T>, T> PoolAllocator<Batch<T>> for FilledBatch<P> {
    fn allocate(&self) -> Batch<T> {
        tracing::trace!(
            fill = self.fill,
            capacity = self.capacity,
            "allocating pre-filled batch"
        );
        let mut batch = Batch::empty(self.capacity);
        for _ in 0..self.fill {
            batch.push(self.allocator.allocate());
        }
        batch
    }
}
