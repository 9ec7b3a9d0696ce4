use thiserror::Error;

/// Reasons a [`PoolConfig`](crate::PoolConfig) is rejected by strict
/// validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The batch capacity is zero.
    #[error("batch capacity must be positive")]
    ZeroCapacity,
    /// The initial fill of a ready batch is zero.
    #[error("initial fill must be positive")]
    ZeroFill,
    /// The initial fill does not fit into a batch.
    #[error("initial fill {fill} exceeds batch capacity {capacity}")]
    FillExceedsCapacity {
        /// Requested initial fill.
        fill: usize,
        /// Requested batch capacity.
        capacity: usize,
    },
}
