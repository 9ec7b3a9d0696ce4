use crate::{slot_cache::default_slots, ConfigError};

/// Default number of objects a batch can hold.
pub const DEFAULT_BATCH_CAPACITY: usize = 256;

/// Default number of objects a freshly created ready batch is filled with.
pub const DEFAULT_INITIAL_FILL: usize = 256;

/// Tuning knobs of a [`Pool`](crate::Pool).
///
/// A large `batch_capacity` makes batch transfers rarer but grows the memory
/// held per slot; a large `initial_fill` makes a `get` that has to create a
/// new batch call the allocator that many times in a row. `initial_fill` can
/// never exceed `batch_capacity` and both must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of objects a batch can hold.
    pub batch_capacity: usize,
    /// Number of allocator calls used to fill a new ready batch.
    pub initial_fill: usize,
    /// Number of per-thread fast slots in each of the pool's two caches.
    pub slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            initial_fill: DEFAULT_INITIAL_FILL,
            slots: default_slots(),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with the given batch capacity and initial fill
    /// and the default slot count.
    pub fn new(batch_capacity: usize, initial_fill: usize) -> Self {
        PoolConfig {
            batch_capacity,
            initial_fill,
            ..Default::default()
        }
    }

    /// Builds a configuration by applying `options` in order on top of the
    /// defaults. A later option overrides an earlier one of the same kind.
    pub fn from_options<I>(options: I) -> Self
    where
        I: IntoIterator<Item = PoolOption>,
    {
        options
            .into_iter()
            .fold(PoolConfig::default(), |config, option| config.apply(option))
    }

    /// Returns the configuration with `option` applied.
    pub fn apply(mut self, option: PoolOption) -> Self {
        match option {
            PoolOption::BatchCapacity(size) => self.batch_capacity = size,
            PoolOption::InitialFill(size) => self.initial_fill = size,
            PoolOption::Slots(slots) => self.slots = slots,
        }
        self
    }

    /// Checks that `0 < initial_fill <= batch_capacity`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.initial_fill == 0 {
            return Err(ConfigError::ZeroFill);
        }
        if self.initial_fill > self.batch_capacity {
            return Err(ConfigError::FillExceedsCapacity {
                fill: self.initial_fill,
                capacity: self.batch_capacity,
            });
        }
        Ok(())
    }

    /// Returns a usable configuration.
    ///
    /// An invalid capacity/fill combination resets *both* values to their
    /// defaults; a slot count of zero resets to the default slot count.
    pub fn normalized(self) -> Self {
        let mut config = self;
        if let Err(err) = config.validate() {
            tracing::warn!(
                batch_capacity = config.batch_capacity,
                initial_fill = config.initial_fill,
                %err,
                "invalid pool configuration, falling back to defaults"
            );
            config.batch_capacity = DEFAULT_BATCH_CAPACITY;
            config.initial_fill = DEFAULT_INITIAL_FILL;
        }
        if config.slots == 0 {
            config.slots = default_slots();
        }
        config
    }
}

/// A single construction option, see [`Pool::with_options`](crate::Pool::with_options).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOption {
    /// Number of objects a batch can hold.
    #[doc(alias = "PoolSizePerCPU")]
    BatchCapacity(usize),
    /// Number of objects a newly created ready batch starts with.
    #[doc(alias = "InitFullPoolSize")]
    InitialFill(usize),
    /// Number of per-thread fast slots per cache.
    Slots(usize),
}
