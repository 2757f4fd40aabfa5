//! Replica placement as seen by the mutation path.

use std::collections::HashMap;

use awl_types::{ReplicaSet, VolumeId};

/// Source of replica sets and the master address.
///
/// How replicas are chosen is outside the mutation path; it only consumes
/// the answer.
#[async_trait::async_trait]
pub trait Topology: Send + Sync {
    /// Peers (excluding this server) that must receive mutations of `volume_id`.
    async fn replica_set(&self, volume_id: VolumeId) -> ReplicaSet;

    /// Address of the master, used to delete chunks on volumes not served here.
    fn master_address(&self) -> Option<String>;
}

/// Fixed topology loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    master: Option<String>,
    peers: Vec<String>,
    per_volume: HashMap<VolumeId, Vec<String>>,
}

impl StaticTopology {
    /// A topology with no master and no peers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the master address.
    pub fn with_master(mut self, master: impl Into<String>) -> Self {
        self.master = Some(master.into());
        self
    }

    /// Default peers for every volume without an override.
    pub fn with_peers(mut self, peers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.peers = peers.into_iter().map(Into::into).collect();
        self
    }

    /// Replica peers for one volume, replacing the defaults.
    pub fn with_volume(
        mut self,
        volume_id: VolumeId,
        peers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.per_volume
            .insert(volume_id, peers.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait::async_trait]
impl Topology for StaticTopology {
    async fn replica_set(&self, volume_id: VolumeId) -> ReplicaSet {
        let peers = self.per_volume.get(&volume_id).unwrap_or(&self.peers);
        ReplicaSet::new(peers.iter().cloned())
    }

    fn master_address(&self) -> Option<String> {
        self.master.clone()
    }
}
