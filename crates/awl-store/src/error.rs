//! Error types for volume storage operations.

use awl_types::{NeedleKey, VolumeId};

/// Errors that can occur during volume storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The volume is not served by this store.
    #[error("volume not found: {0}")]
    VolumeNotFound(VolumeId),

    /// The volume exists but holds no needle under this key.
    #[error("needle not found: volume={volume_id}, key={key}")]
    NeedleNotFound {
        /// Volume that was searched.
        volume_id: VolumeId,
        /// Key that was requested.
        key: NeedleKey,
    },

    /// The caller's cookie does not match the stored needle.
    #[error("cookie mismatch: volume={volume_id}, key={key}")]
    CookieMismatch {
        /// Volume holding the needle.
        volume_id: VolumeId,
        /// Key of the needle.
        key: NeedleKey,
    },

    /// The volume refuses mutations.
    #[error("volume {0} is read-only")]
    ReadOnlyVolume(VolumeId),

    /// The store has reached its capacity limit.
    #[error("store capacity exceeded: need {needed} bytes, only {available} available")]
    CapacityExceeded {
        /// Bytes needed for the operation.
        needed: u64,
        /// Bytes currently available.
        available: u64,
    },
}
