//! Volume storage contract and backend implementations.
//!
//! This crate defines the [`VolumeStore`] trait the mutation path uses to
//! read, write, and delete needles, along with [`MemoryStore`], an
//! in-memory backend holding plain volumes and erasure-coded volumes side
//! by side.

mod error;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use memory_store::{DEFAULT_MAX_TOMBSTONES, MemoryStore};
pub use traits::{StorageCapacity, VolumeStore};
