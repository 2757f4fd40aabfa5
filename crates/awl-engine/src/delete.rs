//! The delete coordinator.

use awl_store::StoreError;
use awl_types::{EcVolume, FileId, ReplicaSet, now_secs};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::node::VolumeNode;
use crate::replicate::{ReplicaOp, ReplicationMode};
use crate::router::Backend;

/// Result of a delete that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The needle was removed. For a chunk manifest, `size` is the logical
    /// size of the whole object.
    Deleted {
        /// Bytes freed, as seen by the user.
        size: u64,
    },
    /// Nothing was stored under that key.
    NotFound,
}

impl DeleteOutcome {
    /// Size reported to the client; zero when nothing was found.
    pub fn size(&self) -> u64 {
        match self {
            Self::Deleted { size } => *size,
            Self::NotFound => 0,
        }
    }
}

impl VolumeNode {
    /// Delete the needle `fid`.
    ///
    /// Chunk manifests first have every chunk deleted; if any chunk fails
    /// the manifest is kept. `ts` overrides the deletion time.
    pub async fn delete(
        &self,
        fid: FileId,
        ts: Option<u64>,
        mode: ReplicationMode,
    ) -> Result<DeleteOutcome, EngineError> {
        match self.route(fid.volume_id).await? {
            Backend::ErasureCoded(ec) => self.delete_ec(&ec, fid).await,
            Backend::Plain(_) => self.delete_plain(fid, ts, mode).await,
        }
    }

    /// Delete from the erasure-coded representation.
    pub(crate) async fn delete_ec(
        &self,
        ec: &EcVolume,
        fid: FileId,
    ) -> Result<DeleteOutcome, EngineError> {
        match self.store.delete_ec_needle(ec, fid.key, fid.cookie).await {
            Ok(size) => {
                info!(%fid, size, "delete: removed from ec volume");
                Ok(DeleteOutcome::Deleted { size })
            }
            Err(StoreError::NeedleNotFound { .. }) => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(store_error(fid, e)),
        }
    }

    async fn delete_plain(
        &self,
        fid: FileId,
        ts: Option<u64>,
        mode: ReplicationMode,
    ) -> Result<DeleteOutcome, EngineError> {
        let Some(stored) = self.store.read(fid.volume_id, fid.key).await? else {
            debug!(%fid, "delete: not found");
            return Ok(DeleteOutcome::NotFound);
        };
        if stored.cookie != fid.cookie {
            return Err(EngineError::CookieMismatch(fid));
        }

        let mut size = stored.size;
        if stored.is_manifest && mode == ReplicationMode::Originate {
            let master = self.topology.master_address();
            let manifest = self
                .delete_manifest_chunks(&stored.data, stored.compressed, master.as_deref())
                .await?;
            size = manifest.size;
        }

        let last_modified = ts.unwrap_or_else(now_secs);
        if !self.commit_delete(fid, last_modified, mode).await? {
            return Ok(DeleteOutcome::NotFound);
        }

        info!(%fid, size, ?mode, "delete complete");
        Ok(DeleteOutcome::Deleted { size })
    }

    /// Remove `fid` locally, then propagate to the replica set.
    ///
    /// Returns `false` when the needle vanished between the existence check
    /// and this call. Nothing is propagated in that case.
    pub(crate) async fn commit_delete(
        &self,
        fid: FileId,
        last_modified: u64,
        mode: ReplicationMode,
    ) -> Result<bool, EngineError> {
        let replicas = match mode {
            ReplicationMode::Originate => self.topology.replica_set(fid.volume_id).await,
            ReplicationMode::Replica => ReplicaSet::default(),
        };

        match self
            .store
            .delete(fid.volume_id, fid.key, fid.cookie, last_modified)
            .await
        {
            Ok(_) => {}
            Err(StoreError::NeedleNotFound { .. }) => {
                debug!(%fid, "delete: needle removed concurrently");
                return Ok(false);
            }
            Err(e) => return Err(store_error(fid, e)),
        }

        self.propagate(replicas, ReplicaOp::Delete { fid, last_modified })
            .await?;
        Ok(true)
    }
}

fn store_error(fid: FileId, err: StoreError) -> EngineError {
    match err {
        StoreError::CookieMismatch { .. } => EngineError::CookieMismatch(fid),
        other => EngineError::Backend(other),
    }
}
