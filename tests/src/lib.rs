//! Shared test harness for Awl integration tests.
//!
//! Provides [`TestCluster`]: N in-process volume servers whose replica
//! client and master hand mutations straight to each other's engines,
//! the way `type=replicate` requests would arrive over HTTP.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use awl_engine::{
    ChunkDeleter, DeleteOutcome, EngineConfig, EngineError, MutationStats, ReplicaClient,
    ReplicaError, ReplicationMode, RequestContext, SignedGrantVerifier, Topology, UploadRequest,
    VolumeNode, WriteOutcome, sign_grant,
};
use awl_store::MemoryStore;
use awl_types::{FileId, Needle, ReplicaSet, VolumeId};
use tokio::sync::RwLock;

/// Maximum store capacity for test nodes.
const MAX_BYTES: u64 = u64::MAX;

/// Address every node uses for the master.
pub const MASTER: &str = "master:9333";

/// Peer address of node `i`.
pub fn node_addr(i: usize) -> String {
    format!("node-{i}:8080")
}

/// Deterministic pseudo-random payload.
pub fn test_data(size: usize) -> Vec<u8> {
    test_data_seeded(size, 42)
}

/// Deterministic pseudo-random payload with a custom seed.
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..size)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

// =========================================================================
// Shared cluster state
// =========================================================================

/// Placement and liveness shared by every node's collaborators.
#[derive(Default)]
struct Shared {
    /// Nodes, filled once the cluster is built.
    nodes: OnceLock<Vec<Arc<VolumeNode>>>,
    /// Volume → indices of the nodes holding a replica.
    placement: RwLock<HashMap<VolumeId, Vec<usize>>>,
    /// Nodes that refuse every call.
    down: RwLock<HashSet<usize>>,
    /// Key used to sign replica traffic, if grants are enforced.
    signing_key: Option<Vec<u8>>,
}

impl Shared {
    fn index_of(&self, peer: &str) -> Option<usize> {
        peer.strip_prefix("node-")?
            .strip_suffix(":8080")?
            .parse()
            .ok()
    }

    async fn reachable(&self, peer: &str) -> Result<Arc<VolumeNode>, ReplicaError> {
        let i = self
            .index_of(peer)
            .ok_or_else(|| ReplicaError::Transport(format!("unknown peer {peer}")))?;
        if self.down.read().await.contains(&i) {
            return Err(ReplicaError::Transport(format!("{peer} is down")));
        }
        self.nodes
            .get()
            .and_then(|nodes| nodes.get(i).cloned())
            .ok_or_else(|| ReplicaError::Transport(format!("{peer} not started")))
    }

    fn context(&self, fid: FileId) -> RequestContext {
        match &self.signing_key {
            Some(key) => RequestContext::anonymous().with_token(sign_grant(key, &fid.to_string())),
            None => RequestContext::anonymous(),
        }
    }
}

fn to_replica_error(err: EngineError) -> ReplicaError {
    ReplicaError::Status {
        status: 500,
        body: err.to_string(),
    }
}

// =========================================================================
// Mock collaborators
// =========================================================================

/// Placement-driven topology: replicas of a volume are all other holders.
struct ClusterTopology {
    me: usize,
    shared: Arc<Shared>,
}

#[async_trait]
impl Topology for ClusterTopology {
    async fn replica_set(&self, volume_id: VolumeId) -> ReplicaSet {
        let placement = self.shared.placement.read().await;
        let holders = placement.get(&volume_id).cloned().unwrap_or_default();
        ReplicaSet::new(
            holders
                .into_iter()
                .filter(|&i| i != self.me)
                .map(node_addr),
        )
    }

    fn master_address(&self) -> Option<String> {
        Some(MASTER.to_string())
    }
}

/// Replays mutations on peers in replica mode, as the HTTP client would.
struct LoopbackReplicas {
    shared: Arc<Shared>,
}

#[async_trait]
impl ReplicaClient for LoopbackReplicas {
    async fn replicate_write(
        &self,
        peer: &str,
        volume_id: VolumeId,
        needle: &Needle,
    ) -> Result<(), ReplicaError> {
        let node = self.shared.reachable(peer).await?;
        let fid = needle.file_id(volume_id);

        let mut req =
            UploadRequest::new(format!("/{fid}"), needle.data.clone()).with_ts(needle.last_modified);
        if needle.is_manifest {
            req = req.with_chunk_manifest();
        }
        if let Some(mime) = &needle.mime {
            req = req.with_content_type(mime.clone());
        }
        if let Some(name) = &needle.name {
            req = req.with_name(name.clone());
        }
        if needle.compressed {
            req = req.with_gzip();
        }

        node.handle_write(req, ReplicationMode::Replica, &self.shared.context(fid))
            .await
            .map(|_| ())
            .map_err(to_replica_error)
    }

    async fn replicate_delete(
        &self,
        peer: &str,
        fid: FileId,
        last_modified: u64,
    ) -> Result<(), ReplicaError> {
        let node = self.shared.reachable(peer).await?;
        node.handle_delete(
            &format!("/{fid}"),
            Some(last_modified),
            ReplicationMode::Replica,
            &self.shared.context(fid),
        )
        .await
        .map(|_| ())
        .map_err(to_replica_error)
    }
}

/// Stand-in master: forwards a chunk delete to the first live holder of
/// the chunk's volume, which then replicates it.
struct LoopbackMaster {
    shared: Arc<Shared>,
}

#[async_trait]
impl ChunkDeleter for LoopbackMaster {
    async fn delete_chunk(&self, master: &str, fid: FileId) -> Result<(), ReplicaError> {
        if master != MASTER {
            return Err(ReplicaError::Transport(format!("unknown master {master}")));
        }
        let holders = self
            .shared
            .placement
            .read()
            .await
            .get(&fid.volume_id)
            .cloned()
            .unwrap_or_default();
        let Some(&owner) = holders.first() else {
            return Err(ReplicaError::Status {
                status: 404,
                body: format!("volume {} not found", fid.volume_id),
            });
        };
        let node = self.shared.reachable(&node_addr(owner)).await?;
        node.handle_delete(
            &format!("/{fid}"),
            None,
            ReplicationMode::Originate,
            &self.shared.context(fid),
        )
        .await
        .map(|_| ())
        .map_err(to_replica_error)
    }
}

// =========================================================================
// Cluster
// =========================================================================

/// A simulated set of volume servers for integration tests.
pub struct TestCluster {
    nodes: Vec<Arc<VolumeNode>>,
    stores: Vec<Arc<MemoryStore>>,
    stats: Vec<Arc<MutationStats>>,
    shared: Arc<Shared>,
}

impl TestCluster {
    /// Create an N-node cluster with default engine settings.
    pub async fn new(n: usize) -> Self {
        Self::with_config(n, test_config(), None).await
    }

    /// Create an N-node cluster with custom engine settings and an optional
    /// shared signing key.
    pub async fn with_config(n: usize, config: EngineConfig, signing_key: Option<&str>) -> Self {
        assert!(n >= 1, "need at least one node");

        let shared = Arc::new(Shared {
            signing_key: signing_key.map(|k| k.as_bytes().to_vec()),
            ..Shared::default()
        });

        let mut nodes = Vec::with_capacity(n);
        let mut stores = Vec::with_capacity(n);
        let mut stats = Vec::with_capacity(n);
        for i in 0..n {
            let store = Arc::new(MemoryStore::new(MAX_BYTES));
            let node_stats = Arc::new(MutationStats::new());
            let topology = ClusterTopology {
                me: i,
                shared: shared.clone(),
            };
            let mut node = VolumeNode::new(
                config.clone(),
                store.clone(),
                Arc::new(topology),
                Arc::new(LoopbackReplicas {
                    shared: shared.clone(),
                }),
            )
            .with_chunk_deleter(Arc::new(LoopbackMaster {
                shared: shared.clone(),
            }))
            .with_observer(node_stats.clone());
            if let Some(key) = signing_key {
                node = node.with_verifier(Arc::new(SignedGrantVerifier::new(key)));
            }

            nodes.push(Arc::new(node));
            stores.push(store);
            stats.push(node_stats);
        }

        assert!(shared.nodes.set(nodes.clone()).is_ok());

        Self {
            nodes,
            stores,
            stats,
            shared,
        }
    }

    /// Create volume `vid` on each of `holders`; they replicate to each other.
    pub async fn add_volume(&self, vid: u32, holders: &[usize]) {
        let vid = VolumeId(vid);
        for &i in holders {
            self.stores[i].add_volume(vid).await;
        }
        self.shared
            .placement
            .write()
            .await
            .insert(vid, holders.to_vec());
    }

    /// Erasure-code volume `vid` on node `i`.
    pub async fn encode_volume(&self, i: usize, vid: u32) {
        self.stores[i]
            .encode_volume(VolumeId(vid), 4, 2)
            .await
            .unwrap();
    }

    /// Get a reference to node `i`.
    pub fn node(&self, i: usize) -> &VolumeNode {
        &self.nodes[i]
    }

    /// Store backing node `i`.
    pub fn store(&self, i: usize) -> &MemoryStore {
        &self.stores[i]
    }

    /// Mutation counters of node `i`.
    pub fn stats(&self, i: usize) -> &MutationStats {
        &self.stats[i]
    }

    /// Number of nodes in the cluster.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the cluster has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mark a node as "down": replica and master calls to it fail.
    pub async fn kill_node(&self, i: usize) {
        self.shared.down.write().await.insert(i);
    }

    /// Mark a node as reachable again.
    pub async fn revive_node(&self, i: usize) {
        self.shared.down.write().await.remove(&i);
    }

    /// Originate a write of `data` at `fid` on node `i`.
    pub async fn write(&self, i: usize, fid: &str, data: &[u8]) -> Result<WriteOutcome, EngineError> {
        let fid: FileId = fid.parse().expect("valid fid");
        let req = UploadRequest::new(format!("/{fid}"), data.to_vec());
        self.nodes[i]
            .handle_write(req, ReplicationMode::Originate, &self.shared.context(fid))
            .await
    }

    /// Originate a chunk-manifest write on node `i`.
    pub async fn write_manifest(
        &self,
        i: usize,
        fid: &str,
        manifest: &[u8],
    ) -> Result<WriteOutcome, EngineError> {
        let fid: FileId = fid.parse().expect("valid fid");
        let req = UploadRequest::new(format!("/{fid}"), manifest.to_vec()).with_chunk_manifest();
        self.nodes[i]
            .handle_write(req, ReplicationMode::Originate, &self.shared.context(fid))
            .await
    }

    /// Originate a delete of `fid` on node `i`.
    pub async fn delete(&self, i: usize, fid: &str) -> Result<DeleteOutcome, EngineError> {
        let fid: FileId = fid.parse().expect("valid fid");
        self.nodes[i]
            .handle_delete(
                &format!("/{fid}"),
                None,
                ReplicationMode::Originate,
                &self.shared.context(fid),
            )
            .await
    }

    /// Whether node `i` holds a live needle for `fid`.
    pub async fn has(&self, i: usize, fid: &str) -> bool {
        let fid: FileId = fid.parse().expect("valid fid");
        self.read(i, fid).await.is_some()
    }

    /// The needle node `i` holds for `fid`.
    pub async fn read(&self, i: usize, fid: FileId) -> Option<Needle> {
        use awl_store::VolumeStore;
        self.stores[i]
            .read(fid.volume_id, fid.key)
            .await
            .ok()
            .flatten()
    }
}

/// Engine settings with a short replica deadline.
pub fn test_config() -> EngineConfig {
    EngineConfig {
        replica_timeout: std::time::Duration::from_millis(500),
        ..EngineConfig::default()
    }
}
