/// A trait defining the factory that produces new pooled objects.
///
/// The pool calls [`PoolAllocator::allocate`] whenever no reusable object is
/// available. It may be invoked concurrently from any thread, several times in
/// a row when a fresh batch is pre-filled, so implementations shared between
/// threads must be `Sync`.
///
/// Any `Fn() -> T` closure is an allocator:
///
/// ```
/// use batchpool::PoolAllocator;
///
/// let alloc = || Vec::<u8>::with_capacity(64);
/// assert_eq!(alloc.allocate().capacity(), 64);
/// ```
pub trait PoolAllocator<T> {
    /// Creates a new object of type T.
    fn allocate(&self) -> T;
}

impl<T, F> PoolAllocator<T> for F
where
    F: Fn() -> T,
{
    #[inline(always)]
    fn allocate(&self) -> T {
        self()
    }
}
