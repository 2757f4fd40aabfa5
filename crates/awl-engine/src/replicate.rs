//! Replica fan-out.
//!
//! After the local mutation commits, the same mutation is sent to every peer
//! in the volume's [`ReplicaSet`] in parallel. Each call has its own timeout.
//! The fan-out runs in a spawned task so that dropping the request future
//! does not abandon half-propagated mutations. Local state is never rolled
//! back when a peer fails.

use std::sync::Arc;
use std::time::Duration;

use awl_types::{FileId, Needle, ReplicaSet, VolumeId};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{EngineError, ReplicaError, ReplicaFailure};
use crate::node::VolumeNode;

/// Whether a mutation originates here or was forwarded by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationMode {
    /// Client request: run cascades and propagate to replicas.
    #[default]
    Originate,
    /// Forwarded by the originating server: apply locally only.
    Replica,
}

/// Sends committed mutations to peer volume servers.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync {
    /// Store `needle` on `peer` in replica mode.
    async fn replicate_write(
        &self,
        peer: &str,
        volume_id: VolumeId,
        needle: &Needle,
    ) -> Result<(), ReplicaError>;

    /// Delete `fid` on `peer` in replica mode, stamping `last_modified`.
    async fn replicate_delete(
        &self,
        peer: &str,
        fid: FileId,
        last_modified: u64,
    ) -> Result<(), ReplicaError>;
}

/// Deletes chunks that live on volumes this server does not serve.
#[async_trait::async_trait]
pub trait ChunkDeleter: Send + Sync {
    /// Ask the cluster (via `master`) to delete `fid`.
    async fn delete_chunk(&self, master: &str, fid: FileId) -> Result<(), ReplicaError>;
}

/// A committed mutation to replay on peers.
#[derive(Debug, Clone)]
pub enum ReplicaOp {
    /// Replay a write.
    Write {
        /// Target volume.
        volume_id: VolumeId,
        /// Needle as stored locally.
        needle: Needle,
    },
    /// Replay a delete.
    Delete {
        /// Deleted needle.
        fid: FileId,
        /// Deletion time to stamp.
        last_modified: u64,
    },
}

impl ReplicaOp {
    /// File id the operation applies to.
    pub fn fid(&self) -> FileId {
        match self {
            Self::Write { volume_id, needle } => needle.file_id(*volume_id),
            Self::Delete { fid, .. } => *fid,
        }
    }

    async fn send(&self, client: &dyn ReplicaClient, peer: &str) -> Result<(), ReplicaError> {
        match self {
            Self::Write { volume_id, needle } => {
                client.replicate_write(peer, *volume_id, needle).await
            }
            Self::Delete { fid, last_modified } => {
                client.replicate_delete(peer, *fid, *last_modified).await
            }
        }
    }
}

impl VolumeNode {
    /// Send `op` to every peer in `replicas` and wait for all answers.
    ///
    /// Returns [`EngineError::ReplicationFailed`] listing every peer that
    /// errored or timed out.
    pub(crate) async fn propagate(
        &self,
        replicas: ReplicaSet,
        op: ReplicaOp,
    ) -> Result<(), EngineError> {
        if replicas.is_empty() {
            return Ok(());
        }

        let fid = op.fid();
        let client = Arc::clone(&self.replicas);
        let timeout = self.config.replica_timeout;
        let handle = tokio::spawn(fan_out(client, replicas, op, timeout));

        let failures = handle.await.map_err(|e| EngineError::ReplicationFailed {
            failures: vec![ReplicaFailure {
                peer: "*".to_string(),
                reason: format!("fan-out task failed: {e}"),
            }],
        })?;

        if failures.is_empty() {
            debug!(%fid, "replicated to all peers");
            return Ok(());
        }
        for failure in &failures {
            warn!(%fid, peer = %failure.peer, reason = %failure.reason, "replica did not confirm");
        }
        Err(EngineError::ReplicationFailed { failures })
    }
}

async fn fan_out(
    client: Arc<dyn ReplicaClient>,
    replicas: ReplicaSet,
    op: ReplicaOp,
    timeout: Duration,
) -> Vec<ReplicaFailure> {
    let calls = replicas.peers.into_iter().map(|peer| {
        let client = Arc::clone(&client);
        let op = &op;
        async move {
            let reason = match tokio::time::timeout(timeout, op.send(client.as_ref(), &peer)).await
            {
                Ok(Ok(())) => return None,
                Ok(Err(e)) => e.to_string(),
                Err(_) => ReplicaError::Timeout.to_string(),
            };
            Some(ReplicaFailure { peer, reason })
        }
    });

    join_all(calls).await.into_iter().flatten().collect()
}
