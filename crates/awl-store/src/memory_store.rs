//! In-memory volume storage backend.

use std::collections::HashMap;

use awl_types::{Cookie, EcVolume, Needle, NeedleKey, VolumeId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::{StorageCapacity, VolumeStore};

/// Tombstones kept per volume before the oldest are dropped.
pub const DEFAULT_MAX_TOMBSTONES: usize = 65_536;

#[derive(Default)]
struct Volume {
    needles: HashMap<NeedleKey, Needle>,
    /// Deletion time of removed keys.
    tombstones: HashMap<NeedleKey, u64>,
    read_only: bool,
}

impl Volume {
    fn record_tombstone(&mut self, key: NeedleKey, last_modified: u64, max: usize) {
        self.tombstones.insert(key, last_modified);
        while self.tombstones.len() > max {
            let Some(oldest) = self
                .tombstones
                .iter()
                .min_by_key(|&(k, ts)| (*ts, *k))
                .map(|(k, _)| *k)
            else {
                break;
            };
            self.tombstones.remove(&oldest);
        }
    }
}

fn plain_bytes(volumes: &HashMap<VolumeId, Volume>) -> u64 {
    volumes
        .values()
        .flat_map(|v| v.needles.values())
        .map(|n| n.data.len() as u64)
        .sum()
}

fn ec_bytes(ec_volumes: &HashMap<VolumeId, EcEntry>) -> u64 {
    ec_volumes
        .values()
        .flat_map(|e| e.needles.values())
        .map(|n| n.data.len() as u64)
        .sum()
}

struct EcEntry {
    ec: EcVolume,
    needles: HashMap<NeedleKey, Needle>,
}

/// In-memory volume store backed by `RwLock<HashMap>`s.
///
/// Useful for testing and for servers configured to run in memory-only
/// mode. Tracks total stored bytes against a configurable maximum. All
/// mutations serialize under the store's write lock. Locks are always taken
/// plain volumes first, then erasure-coded volumes.
///
/// Each volume remembers the deletion time of at most
/// [`DEFAULT_MAX_TOMBSTONES`] keys (see [`MemoryStore::with_max_tombstones`]);
/// [`MemoryStore::prune_tombstones`] drops older ones on demand.
pub struct MemoryStore {
    volumes: RwLock<HashMap<VolumeId, Volume>>,
    ec_volumes: RwLock<HashMap<VolumeId, EcEntry>>,
    max_bytes: u64,
    max_tombstones: usize,
}

impl MemoryStore {
    /// Create a new in-memory store with the given capacity limit.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            volumes: RwLock::new(HashMap::new()),
            ec_volumes: RwLock::new(HashMap::new()),
            max_bytes,
            max_tombstones: DEFAULT_MAX_TOMBSTONES,
        }
    }

    /// Keep at most `max` tombstones per volume, evicting the oldest.
    pub fn with_max_tombstones(mut self, max: usize) -> Self {
        self.max_tombstones = max;
        self
    }

    /// Drop tombstones stamped before `before`. Returns how many went.
    pub async fn prune_tombstones(&self, before: u64) -> usize {
        let mut volumes = self.volumes.write().await;
        let mut pruned = 0;
        for volume in volumes.values_mut() {
            let kept = volume.tombstones.len();
            volume.tombstones.retain(|_, ts| *ts >= before);
            pruned += kept - volume.tombstones.len();
        }
        if pruned > 0 {
            debug!(pruned, before, "pruned tombstones");
        }
        pruned
    }

    /// Start serving an empty plain volume. No-op if it already exists.
    pub async fn add_volume(&self, volume_id: VolumeId) {
        self.volumes.write().await.entry(volume_id).or_default();
    }

    /// Start serving an empty erasure-coded volume.
    pub async fn add_ec_volume(&self, ec: EcVolume) {
        self.ec_volumes.write().await.insert(
            ec.volume_id,
            EcEntry {
                ec,
                needles: HashMap::new(),
            },
        );
    }

    /// Produce the erasure-coded form of a plain volume.
    ///
    /// The plain volume stays in place; from now on deletes for this id are
    /// owned by the erasure-coded copy.
    pub async fn encode_volume(
        &self,
        volume_id: VolumeId,
        data_shards: u8,
        parity_shards: u8,
    ) -> Result<EcVolume, StoreError> {
        let volumes = self.volumes.read().await;
        let volume = volumes
            .get(&volume_id)
            .ok_or(StoreError::VolumeNotFound(volume_id))?;

        let ec = EcVolume::new(volume_id, data_shards, parity_shards);
        let needles = volume.needles.clone();
        debug!(%volume_id, needles = needles.len(), "encoded volume");

        self.ec_volumes
            .write()
            .await
            .insert(volume_id, EcEntry { ec, needles });
        Ok(ec)
    }

    /// Stop serving a plain volume, dropping its needles.
    pub async fn remove_volume(&self, volume_id: VolumeId) {
        self.volumes.write().await.remove(&volume_id);
    }

    /// Mark a plain volume as read-only (or writable again).
    pub async fn set_read_only(&self, volume_id: VolumeId, read_only: bool) -> Result<(), StoreError> {
        let mut volumes = self.volumes.write().await;
        let volume = volumes
            .get_mut(&volume_id)
            .ok_or(StoreError::VolumeNotFound(volume_id))?;
        volume.read_only = read_only;
        Ok(())
    }

    /// Number of live needles in a plain volume.
    pub async fn needle_count(&self, volume_id: VolumeId) -> usize {
        self.volumes
            .read()
            .await
            .get(&volume_id)
            .map_or(0, |v| v.needles.len())
    }

    /// Whether the erasure-coded copy of `volume_id` still holds `key`.
    pub async fn has_ec_needle(&self, volume_id: VolumeId, key: NeedleKey) -> bool {
        self.ec_volumes
            .read()
            .await
            .get(&volume_id)
            .is_some_and(|e| e.needles.contains_key(&key))
    }

    /// Deletion time recorded for a removed key.
    pub async fn tombstone(&self, volume_id: VolumeId, key: NeedleKey) -> Option<u64> {
        self.volumes
            .read()
            .await
            .get(&volume_id)
            .and_then(|v| v.tombstones.get(&key).copied())
    }

    /// Total stored payload bytes across plain and erasure-coded volumes.
    pub async fn used_bytes(&self) -> u64 {
        let volumes = self.volumes.read().await;
        plain_bytes(&volumes) + ec_bytes(&*self.ec_volumes.read().await)
    }
}

#[async_trait::async_trait]
impl VolumeStore for MemoryStore {
    async fn read(&self, volume_id: VolumeId, key: NeedleKey) -> Result<Option<Needle>, StoreError> {
        let volumes = self.volumes.read().await;
        let volume = volumes
            .get(&volume_id)
            .ok_or(StoreError::VolumeNotFound(volume_id))?;
        Ok(volume.needles.get(&key).cloned())
    }

    async fn write(&self, volume_id: VolumeId, needle: &Needle) -> Result<bool, StoreError> {
        let mut volumes = self.volumes.write().await;
        // Usage is measured under the same lock that commits the write.
        let used = plain_bytes(&volumes) + ec_bytes(&*self.ec_volumes.read().await);
        let volume = volumes
            .get_mut(&volume_id)
            .ok_or(StoreError::VolumeNotFound(volume_id))?;
        if volume.read_only {
            return Err(StoreError::ReadOnlyVolume(volume_id));
        }

        let existing = volume.needles.get(&needle.key);
        if existing.is_some_and(|old| old.is_unchanged(needle)) {
            debug!(%volume_id, key = %needle.key, "unchanged needle, skipping write");
            return Ok(true);
        }

        // If we're replacing an existing needle, account for freed space.
        let existing_len = existing.map_or(0, |n| n.data.len() as u64);
        let net_increase = (needle.data.len() as u64).saturating_sub(existing_len);
        if used + net_increase > self.max_bytes {
            return Err(StoreError::CapacityExceeded {
                needed: net_increase,
                available: self.max_bytes.saturating_sub(used),
            });
        }

        debug!(%volume_id, key = %needle.key, size = needle.size, "storing needle in memory");
        volume.tombstones.remove(&needle.key);
        volume.needles.insert(needle.key, needle.clone());
        Ok(false)
    }

    async fn delete(
        &self,
        volume_id: VolumeId,
        key: NeedleKey,
        cookie: Cookie,
        last_modified: u64,
    ) -> Result<u64, StoreError> {
        let mut volumes = self.volumes.write().await;
        let volume = volumes
            .get_mut(&volume_id)
            .ok_or(StoreError::VolumeNotFound(volume_id))?;
        if volume.read_only {
            return Err(StoreError::ReadOnlyVolume(volume_id));
        }

        let stored = volume
            .needles
            .get(&key)
            .ok_or(StoreError::NeedleNotFound { volume_id, key })?;
        if stored.cookie != cookie {
            return Err(StoreError::CookieMismatch { volume_id, key });
        }

        let size = stored.size;
        volume.needles.remove(&key);
        volume.record_tombstone(key, last_modified, self.max_tombstones);
        debug!(%volume_id, %key, size, "deleted needle from memory");
        Ok(size)
    }

    async fn has_volume(&self, volume_id: VolumeId) -> bool {
        self.volumes.read().await.contains_key(&volume_id)
    }

    async fn find_ec_volume(&self, volume_id: VolumeId) -> Option<EcVolume> {
        self.ec_volumes.read().await.get(&volume_id).map(|e| e.ec)
    }

    async fn delete_ec_needle(
        &self,
        ec: &EcVolume,
        key: NeedleKey,
        cookie: Cookie,
    ) -> Result<u64, StoreError> {
        let volume_id = ec.volume_id;
        let mut ec_volumes = self.ec_volumes.write().await;
        let entry = ec_volumes
            .get_mut(&volume_id)
            .ok_or(StoreError::VolumeNotFound(volume_id))?;

        let stored = entry
            .needles
            .get(&key)
            .ok_or(StoreError::NeedleNotFound { volume_id, key })?;
        if stored.cookie != cookie {
            return Err(StoreError::CookieMismatch { volume_id, key });
        }

        let size = stored.size;
        entry.needles.remove(&key);
        debug!(%volume_id, %key, size, "deleted needle from ec volume");
        Ok(size)
    }

    async fn capacity(&self) -> StorageCapacity {
        let used = self.used_bytes().await;
        StorageCapacity {
            total_bytes: self.max_bytes,
            used_bytes: used,
            available_bytes: self.max_bytes.saturating_sub(used),
        }
    }
}
