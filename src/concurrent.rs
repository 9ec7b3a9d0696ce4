use crate::{
    batch::{Batch, EmptyBatch, FilledBatch},
    ConfigError, PoolAllocator, PoolConfig, PoolOption, SlotCache,
};
use std::{
    fmt,
    mem::{forget, MaybeUninit},
    ops::{Deref, DerefMut},
    ptr,
    sync::Arc,
};

/// A concurrent object pool that moves objects between threads in batches.
///
/// The pool keeps two [`SlotCache`]s of batches: the *ready* cache holds
/// batches with at least one object to hand out, the *growing* cache holds
/// batches with room for returned objects. [`Self::get`] pops from a ready
/// batch and [`Self::put`] pushes onto a growing batch; only when a batch runs
/// empty or fills up does it cross over to the other cache. With a batch
/// capacity of `K` at most one in `K` calls touches that boundary, and all
/// other calls are a slot swap plus a push or pop.
///
/// Batches are never freed while the pool is alive. A workload that only
/// calls `get` leaves one empty batch in the growing cache per `K` objects
/// handed out; they are reused once objects are `put` back and released when
/// the pool is dropped.
pub struct Pool<P, T> {
    ready: SlotCache<Batch<T>, FilledBatch<P>>,
    growing: SlotCache<Batch<T>, EmptyBatch>,
    config: PoolConfig,
}

impl<P, T> Pool<P, T> {
    /// Returns the configuration the pool is running with.
    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Returns the allocator objects are created with.
    pub fn allocator(&self) -> &P {
        &self.ready.allocator().allocator
    }

    /// Wraps the pool in an atomic reference counter, enabling the use of
    /// [`Self::get_rc`] to obtain objects that are not tied to a borrow of
    /// the pool.
    pub fn to_rc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Returns an object to the pool for later reuse.
    ///
    /// The object is pushed onto a growing batch. A batch that becomes full
    /// moves to the ready cache, where any thread's `get` can consume it.
    pub fn put(&self, obj: T) {
        let mut batch = self.growing.get();
        batch.push(obj);
        if batch.is_full() {
            tracing::trace!(len = batch.len(), "batch full, moving to ready cache");
            self.ready.put(batch);
        } else {
            self.growing.put(batch);
        }
    }
}

impl<P: PoolAllocator<T>, T> Pool<P, T> {
    /// Creates a pool with the default configuration.
    pub fn new(allocator: P) -> Self {
        Self::with_config(allocator, PoolConfig::default())
    }

    /// Creates a pool from a list of options applied in order.
    ///
    /// Never fails: an invalid capacity/fill combination falls back to the
    /// defaults, see [`PoolConfig::normalized`].
    pub fn with_options<I>(allocator: P, options: I) -> Self
    where
        I: IntoIterator<Item = PoolOption>,
    {
        Self::with_config(allocator, PoolConfig::from_options(options))
    }

    /// Creates a pool with the given configuration, normalizing it first.
    pub fn with_config(allocator: P, config: PoolConfig) -> Self {
        let config = config.normalized();
        tracing::debug!(
            batch_capacity = config.batch_capacity,
            initial_fill = config.initial_fill,
            slots = config.slots,
            "creating batching pool"
        );
        Pool {
            ready: SlotCache::new(
                config.slots,
                FilledBatch {
                    allocator,
                    fill: config.initial_fill,
                    capacity: config.batch_capacity,
                },
            ),
            growing: SlotCache::new(
                config.slots,
                EmptyBatch {
                    capacity: config.batch_capacity,
                },
            ),
            config,
        }
    }

    /// Creates a pool, rejecting an invalid configuration instead of falling
    /// back to the defaults.
    pub fn try_with_config(allocator: P, config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(allocator, config))
    }

    /// Takes an object from the pool.
    ///
    /// If no ready batch is reachable a new one is created, calling the
    /// allocator `initial_fill` times. A batch drained by this call moves to
    /// the growing cache so its capacity is refilled by later `put`s.
    pub fn get(&self) -> T {
        let mut batch = self.ready.get();
        let len = batch.len();
        // Ready batches are never empty; the fallback keeps the pool available
        // should that ever be violated.
        let obj = match batch.pop() {
            Some(obj) => obj,
            None => self.allocator().allocate(),
        };
        if len > 1 {
            self.ready.put(batch);
        } else {
            tracing::trace!("batch drained, moving to growing cache");
            self.growing.put(batch);
        }
        obj
    }

    /// Takes an object wrapped in a guard that puts it back into the pool
    /// when dropped.
    pub fn get_guard(&self) -> RefGuard<'_, P, T> {
        RefGuard::new(self.get(), self)
    }

    /// Takes an object wrapped in a guard that holds an arc reference to the
    /// owning pool and puts the object back when dropped.
    pub fn get_rc(self: Arc<Self>) -> RcGuard<P, T> {
        let obj = self.get();
        RcGuard::new(obj, self)
    }
}

impl<P, T> fmt::Debug for Pool<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A guard over an object taken from a [`Pool`].
///
/// The object is put back into the pool when the guard is dropped.
pub struct RefGuard<'a, P, T> {
    obj: MaybeUninit<T>,
    pool: &'a Pool<P, T>,
}

impl<'a, P, T> RefGuard<'a, P, T> {
    fn new(obj: T, pool: &'a Pool<P, T>) -> Self {
        RefGuard {
            obj: MaybeUninit::new(obj),
            pool,
        }
    }

    /// Consumes the guard and returns the object without putting it back
    /// into the pool.
    pub fn into_inner(self) -> T {
        let obj = unsafe { self.obj.as_ptr().read() };
        forget(self);
        obj
    }
}

impl<'a, P, T> Deref for RefGuard<'a, P, T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.obj.as_ptr() }
    }
}

impl<'a, P, T> DerefMut for RefGuard<'a, P, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.obj.as_mut_ptr() }
    }
}

impl<'a, P, T> Drop for RefGuard<'a, P, T> {
    fn drop(&mut self) {
        let obj = unsafe { ptr::read(self.obj.as_ptr()) };
        self.pool.put(obj);
    }
}

impl<'a, P, T: fmt::Debug> fmt::Debug for RefGuard<'a, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, P, T> AsRef<T> for RefGuard<'a, P, T> {
    #[inline(always)]
    fn as_ref(&self) -> &T {
        self
    }
}

/// A guard over an object taken from an [`Arc`]-wrapped [`Pool`].
///
/// The object is put back into the pool when the guard is dropped.
pub struct RcGuard<P, T> {
    obj: MaybeUninit<T>,
    pool: Arc<Pool<P, T>>,
}

impl<P, T> RcGuard<P, T> {
    fn new(obj: T, pool: Arc<Pool<P, T>>) -> Self {
        RcGuard {
            obj: MaybeUninit::new(obj),
            pool,
        }
    }

    /// Consumes the guard and returns the object without putting it back
    /// into the pool.
    pub fn into_inner(mut self) -> T {
        let obj = unsafe { self.obj.as_ptr().read() };
        // Drop the arc reference
        unsafe { ptr::drop_in_place(&mut self.pool) }
        forget(self);
        obj
    }
}

impl<P, T> Deref for RcGuard<P, T> {
    type Target = T;
    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.obj.as_ptr() }
    }
}

impl<P, T> DerefMut for RcGuard<P, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.obj.as_mut_ptr() }
    }
}

impl<P, T> Drop for RcGuard<P, T> {
    fn drop(&mut self) {
        let obj = unsafe { ptr::read(self.obj.as_ptr()) };
        self.pool.put(obj);
    }
}

impl<P, T: fmt::Debug> fmt::Debug for RcGuard<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<P, T> AsRef<T> for RcGuard<P, T> {
    #[inline(always)]
    fn as_ref(&self) -> &T {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        thread,
    };

    impl<P, T> Pool<P, T> {
        /// Lengths of the batches resident in the ready and growing caches.
        fn resident(&self) -> (Vec<usize>, Vec<usize>) {
            let mut ready = Vec::new();
            let mut growing = Vec::new();
            self.ready.inspect(|batch| ready.push(batch.len()));
            self.growing.inspect(|batch| growing.push(batch.len()));
            (ready, growing)
        }

        fn assert_batch_invariants(&self) {
            let capacity = self.config.batch_capacity;
            self.ready.inspect(|batch| {
                assert_eq!(batch.capacity(), capacity);
                assert!(batch.len() >= 1, "empty batch in ready cache");
                assert!(batch.len() <= capacity);
            });
            self.growing.inspect(|batch| {
                assert_eq!(batch.capacity(), capacity);
                assert!(batch.len() < capacity, "full batch in growing cache");
            });
        }

        fn resident_objects(&self) -> usize {
            let (ready, growing) = self.resident();
            ready.iter().chain(growing.iter()).sum()
        }
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            slots: 1,
            ..PoolConfig::new(4, 2)
        }
    }

    #[test]
    fn drained_batch_moves_to_growing() {
        let next = AtomicUsize::new(0);
        let pool: Pool<_, usize> =
            Pool::with_config(|| next.fetch_add(1, Ordering::Relaxed) + 1, small_config());

        assert_eq!(pool.get(), 2);
        assert_eq!(pool.resident(), (vec![1], vec![]));
        assert_eq!(pool.get(), 1);
        assert_eq!(pool.resident(), (vec![], vec![0]));
        pool.assert_batch_invariants();
    }

    #[test]
    fn full_batch_moves_to_ready() {
        let pool: Pool<_, u32> = Pool::with_config(|| 0u32, small_config());
        for i in 1..=3 {
            pool.put(i);
            assert_eq!(pool.resident(), (vec![], vec![i as usize]));
        }
        pool.put(4);
        assert_eq!(pool.resident(), (vec![4], vec![]));
        pool.assert_batch_invariants();
    }

    #[test]
    fn churn_keeps_invariants_and_conserves_objects() {
        let created = AtomicUsize::new(0);
        let pool: Pool<_, usize> = Pool::with_config(
            || created.fetch_add(1, Ordering::Relaxed),
            small_config(),
        );
        let mut held = Vec::new();
        for round in 0..64 {
            if round % 3 == 2 {
                held.push(pool.get());
            }
            pool.put(1000 + round);
            held.push(pool.get());
            if let Some(obj) = held.pop() {
                pool.put(obj);
            }
            pool.assert_batch_invariants();
            assert_eq!(
                pool.resident_objects() + held.len(),
                created.load(Ordering::Relaxed) + round + 1
            );
        }
    }

    #[test]
    fn allocator_panic_propagates_and_leaves_pool_usable() {
        let calls = AtomicUsize::new(0);
        let pool: Pool<_, usize> = Pool::with_config(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 5 {
                    panic!("allocator failed");
                }
                n
            },
            small_config(),
        );
        assert_eq!(pool.get(), 2);
        assert_eq!(pool.get(), 1);
        assert_eq!(pool.get(), 4);
        assert_eq!(pool.get(), 3);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| pool.get()));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        pool.assert_batch_invariants();
        assert_eq!(pool.resident_objects(), 0);

        pool.put(9);
        assert_eq!(pool.resident(), (vec![], vec![1, 0]));
        assert_eq!(pool.get(), 7);
        assert_eq!(pool.get(), 6);
        pool.assert_batch_invariants();
        assert_eq!(pool.resident_objects(), 1);
    }

    #[test]
    fn concurrent_get_put_never_shares_an_object() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 2_000;

        let created = AtomicUsize::new(0);
        let in_use = Mutex::new(HashSet::new());
        let pool: Pool<_, usize> = Pool::with_config(
            || created.fetch_add(1, Ordering::Relaxed),
            PoolConfig {
                slots: 2,
                ..PoolConfig::new(8, 3)
            },
        );

        let kept: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|t| {
                    let pool = &pool;
                    let in_use = &in_use;
                    s.spawn(move || {
                        let mut mine = Vec::new();
                        for i in 0..ROUNDS {
                            let obj = pool.get();
                            assert!(in_use.lock().unwrap().insert(obj), "object {obj} shared");
                            mine.push(obj);
                            if (i + t) % 3 != 0 {
                                let obj = mine.swap_remove(i % mine.len());
                                assert!(in_use.lock().unwrap().remove(&obj));
                                pool.put(obj);
                            }
                        }
                        mine.len()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(kept, in_use.lock().unwrap().len());
        pool.assert_batch_invariants();
        assert_eq!(
            created.load(Ordering::Relaxed),
            pool.resident_objects() + kept
        );
    }
}
