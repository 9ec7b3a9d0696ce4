#![doc = include_str!("../README.md")]
#![warn(missing_docs, missing_debug_implementations)]
mod batch;
mod concurrent;
mod config;
mod error;
mod pool_allocator;
mod slot_cache;

pub use concurrent::*;
pub use config::*;
pub use error::*;
pub use pool_allocator::*;
pub use slot_cache::*;
