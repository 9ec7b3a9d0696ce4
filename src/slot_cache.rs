use crate::PoolAllocator;
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};
use crossbeam_utils::{atomic::AtomicCell, CachePadded};
use parking_lot::Mutex;

static NEXT_THREAD_INDEX: AtomicUsize = AtomicUsize::new(0);

std::thread_local! {
    static THREAD_INDEX: usize = NEXT_THREAD_INDEX.fetch_add(1, Ordering::Relaxed);
}

/// Returns the number of slots used when none is configured: one per unit of
/// available parallelism.
pub fn default_slots() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A concurrent cache holding boxed objects in per-thread slots.
///
/// Every thread is mapped to one slot which is read and written with a single
/// atomic swap. When a thread puts an object while its slot is occupied, the
/// displaced object moves to an overflow list guarded by a mutex. `get` looks
/// at the slot first, then at the overflow, and only then asks the allocator
/// for a new object.
///
/// Objects are kept boxed so the slot is a single pointer wide; an object
/// taken out with [`Self::get`] is exclusively owned by the caller until it is
/// handed back with [`Self::put`]. The cache makes no ordering or fairness
/// guarantees and never drops a stored object before the cache itself is
/// dropped.
pub struct SlotCache<T, A> {
    allocator: A,
    slots: Box<[CachePadded<AtomicCell<Option<Box<T>>>>]>,
    overflow: Mutex<Vec<Box<T>>>,
}

impl<T, A> SlotCache<T, A> {
    /// Creates an empty cache with `slots` fast slots.
    ///
    /// A slot count of zero is treated as one.
    pub fn new(slots: usize, allocator: A) -> Self {
        debug_assert!(AtomicCell::<Option<Box<T>>>::is_lock_free());
        let slots = (0..slots.max(1))
            .map(|_| CachePadded::new(AtomicCell::new(None)))
            .collect();
        SlotCache {
            allocator,
            slots,
            overflow: Mutex::new(Vec::new()),
        }
    }

    /// Gets the number of fast slots.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the allocator used to create new objects.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    #[inline]
    fn local_slot(&self) -> &AtomicCell<Option<Box<T>>> {
        let index = THREAD_INDEX.with(|index| *index) % self.slots.len();
        &self.slots[index]
    }

    /// Takes a previously stored object without creating a new one.
    ///
    /// Returns `None` when both the calling thread's slot and the overflow are
    /// empty.
    pub fn try_get(&self) -> Option<Box<T>> {
        if let Some(obj) = self.local_slot().take() {
            return Some(obj);
        }
        self.overflow.lock().pop()
    }

    /// Stores an object for later reuse.
    ///
    /// The object lands in the calling thread's slot; whatever occupied the
    /// slot before is pushed to the overflow list.
    pub fn put(&self, obj: Box<T>) {
        if let Some(displaced) = self.local_slot().swap(Some(obj)) {
            self.overflow.lock().push(displaced);
        }
    }

    /// Calls `f` on every stored object. Objects are taken out of their slot
    /// while inspected, so this is only meaningful without concurrent users.
    #[cfg(test)]
    pub(crate) fn inspect(&self, mut f: impl FnMut(&T)) {
        for slot in self.slots.iter() {
            if let Some(obj) = slot.take() {
                f(&obj);
                slot.store(Some(obj));
            }
        }
        for obj in self.overflow.lock().iter() {
            f(obj);
        }
    }
}

impl<T, A: PoolAllocator<T>> SlotCache<T, A> {
    /// Takes a stored object, creating one with the allocator if the cache
    /// holds none reachable from the calling thread.
    #[inline]
    pub fn get(&self) -> Box<T> {
        match self.try_get() {
            Some(obj) => obj,
            None => Box::new(self.allocator.allocate()),
        }
    }
}

impl<T, A: fmt::Debug> fmt::Debug for SlotCache<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotCache")
            .field("allocator", &self.allocator)
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}
