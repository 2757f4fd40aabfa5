//! Core trait and types for volume storage.

use awl_types::{Cookie, EcVolume, Needle, NeedleKey, VolumeId};

use crate::error::StoreError;

/// Capacity information for a storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageCapacity {
    /// Total capacity in bytes.
    pub total_bytes: u64,
    /// Bytes currently used.
    pub used_bytes: u64,
    /// Bytes available for new data.
    pub available_bytes: u64,
}

/// Local needle storage, addressed by volume.
///
/// All implementations must be `Send + Sync` for use across async tasks.
/// Mutations on the same volume are serialized by the implementation;
/// callers hold no locks across calls.
#[async_trait::async_trait]
pub trait VolumeStore: Send + Sync {
    /// Read the needle stored under `key`.
    ///
    /// Returns `Ok(None)` when the volume exists but the key is absent, and
    /// [`StoreError::VolumeNotFound`] when the volume is not served here.
    async fn read(&self, volume_id: VolumeId, key: NeedleKey) -> Result<Option<Needle>, StoreError>;

    /// Write `needle` into a plain volume.
    ///
    /// Returns `true` when the stored needle at that key is unchanged by this
    /// write (same cookie, fingerprint and bytes), in which case nothing is
    /// rewritten.
    async fn write(&self, volume_id: VolumeId, needle: &Needle) -> Result<bool, StoreError>;

    /// Remove the needle under `key`, stamping `last_modified` on the
    /// tombstone. Returns the logical size that was removed.
    async fn delete(
        &self,
        volume_id: VolumeId,
        key: NeedleKey,
        cookie: Cookie,
        last_modified: u64,
    ) -> Result<u64, StoreError>;

    /// Whether a plain volume with this id is served here.
    async fn has_volume(&self, volume_id: VolumeId) -> bool;

    /// The erasure-coded representation of `volume_id`, if present locally.
    async fn find_ec_volume(&self, volume_id: VolumeId) -> Option<EcVolume>;

    /// Delete a needle from an erasure-coded volume, checking the cookie.
    ///
    /// Returns the logical size removed, [`StoreError::NeedleNotFound`] when
    /// the key is absent and [`StoreError::CookieMismatch`] when the cookie
    /// is wrong.
    async fn delete_ec_needle(
        &self,
        ec: &EcVolume,
        key: NeedleKey,
        cookie: Cookie,
    ) -> Result<u64, StoreError>;

    /// Report current storage capacity.
    async fn capacity(&self) -> StorageCapacity;
}
