//! Cascading deletion of chunk manifests.
//!
//! A manifest's chunks are deleted in offset order before the manifest
//! itself. The first failing chunk aborts the cascade; chunks deleted
//! before it stay deleted and the manifest is left in place so the caller
//! can retry.

use awl_types::{ChunkManifest, FileId, VolumeId, now_secs};
use futures::{StreamExt, TryStreamExt, future, stream};
use tracing::{debug, info};

use crate::error::{EngineError, ReplicaFailure};
use crate::node::VolumeNode;
use crate::replicate::ReplicationMode;
use crate::router::Backend;

impl VolumeNode {
    /// Decode a manifest payload and delete every chunk it lists.
    ///
    /// `master` is used to delete chunks on volumes this server does not
    /// serve. At most `cascade_parallelism` chunks are in flight at once.
    pub async fn delete_manifest_chunks(
        &self,
        payload: &[u8],
        compressed: bool,
        master: Option<&str>,
    ) -> Result<ChunkManifest, EngineError> {
        let manifest = ChunkManifest::load(payload, compressed)
            .map_err(|e| EngineError::MalformedManifest(e.to_string()))?;
        let parallelism = self.config.cascade_parallelism.max(1);

        debug!(chunks = manifest.chunks.len(), parallelism, "cascade: start");

        stream::iter(manifest.chunk_ids())
            .map(|chunk| async move {
                self.delete_chunk(chunk, master)
                    .await
                    .map_err(|e| EngineError::CascadeDeletionFailed {
                        chunk,
                        source: Box::new(e),
                    })
            })
            .buffered(parallelism)
            .try_for_each(|()| future::ready(Ok(())))
            .await?;

        info!(
            chunks = manifest.chunks.len(),
            size = manifest.size,
            "cascade: all chunks deleted"
        );
        Ok(manifest)
    }

    /// Delete one chunk of a manifest.
    ///
    /// A chunk that is already gone counts as deleted. A chunk that is
    /// itself a manifest is rejected.
    async fn delete_chunk(&self, fid: FileId, master: Option<&str>) -> Result<(), EngineError> {
        let backend = match self.route(fid.volume_id).await {
            Ok(backend) => backend,
            Err(EngineError::UnknownVolume(volume_id)) => {
                return self.delete_remote_chunk(fid, master, volume_id).await;
            }
            Err(e) => return Err(e),
        };

        match backend {
            Backend::ErasureCoded(ec) => self.delete_ec(&ec, fid).await.map(|_| ()),
            Backend::Plain(volume_id) => {
                let Some(stored) = self.store.read(volume_id, fid.key).await? else {
                    debug!(%fid, "cascade: chunk already gone");
                    return Ok(());
                };
                if stored.cookie != fid.cookie {
                    return Err(EngineError::CookieMismatch(fid));
                }
                if stored.is_manifest {
                    return Err(EngineError::MalformedManifest(format!(
                        "chunk {fid} is itself a chunk manifest"
                    )));
                }
                // A chunk removed concurrently still counts as deleted.
                self.commit_delete(fid, now_secs(), ReplicationMode::Originate)
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn delete_remote_chunk(
        &self,
        fid: FileId,
        master: Option<&str>,
        volume_id: VolumeId,
    ) -> Result<(), EngineError> {
        let (Some(deleter), Some(master)) = (self.chunk_deleter.as_ref(), master) else {
            return Err(EngineError::UnknownVolume(volume_id));
        };

        debug!(%fid, master, "cascade: delegating chunk delete");
        deleter
            .delete_chunk(master, fid)
            .await
            .map_err(|e| EngineError::ReplicationFailed {
                failures: vec![ReplicaFailure {
                    peer: master.to_string(),
                    reason: e.to_string(),
                }],
            })
    }
}
