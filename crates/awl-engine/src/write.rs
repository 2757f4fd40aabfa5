//! The write coordinator.

use awl_store::StoreError;
use awl_types::{FileId, Needle, ReplicaSet, VolumeId};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::node::VolumeNode;
use crate::replicate::{ReplicaOp, ReplicationMode};
use crate::router::Backend;

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Address of the written needle.
    pub fid: FileId,
    /// The needle was already stored unchanged; nothing was written or
    /// propagated.
    pub is_duplicate: bool,
    /// Content fingerprint.
    pub etag: String,
    /// Stored file name.
    pub name: Option<String>,
    /// Stored mime type.
    pub mime: Option<String>,
    /// Uncompressed payload length.
    pub size: u64,
}

impl VolumeNode {
    /// Store `needle` in `volume_id` and, when originating, on every replica.
    ///
    /// An unchanged re-upload returns immediately with `is_duplicate` set.
    /// When a replica fails the local write stays in place and
    /// [`EngineError::ReplicationFailed`] is returned.
    pub async fn write(
        &self,
        volume_id: VolumeId,
        needle: &Needle,
        mode: ReplicationMode,
    ) -> Result<WriteOutcome, EngineError> {
        let fid = needle.file_id(volume_id);

        if let Backend::ErasureCoded(_) = self.route(volume_id).await? {
            return Err(StoreError::ReadOnlyVolume(volume_id).into());
        }

        let replicas = match mode {
            ReplicationMode::Originate => self.topology.replica_set(volume_id).await,
            ReplicationMode::Replica => ReplicaSet::default(),
        };

        let is_duplicate = self.store.write(volume_id, needle).await?;
        let outcome = WriteOutcome {
            fid,
            is_duplicate,
            etag: needle.etag(),
            name: needle.name.clone(),
            mime: needle.mime.clone(),
            size: needle.size,
        };

        if is_duplicate {
            debug!(%fid, "write: unchanged, skipping replication");
            return Ok(outcome);
        }

        let peers = replicas.len();
        self.propagate(
            replicas,
            ReplicaOp::Write {
                volume_id,
                needle: needle.clone(),
            },
        )
        .await?;

        info!(%fid, size = needle.size, peers, ?mode, "write complete");
        Ok(outcome)
    }
}
