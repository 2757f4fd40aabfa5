//! Shared test utilities for awl-engine tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use awl_store::{MemoryStore, VolumeStore};
use awl_types::{ChunkInfo, ChunkManifest, Cookie, FileId, Needle, NeedleKey, VolumeId};

use crate::error::ReplicaError;
use crate::node::{EngineConfig, VolumeNode};
use crate::observe::MutationStats;
use crate::replicate::{ChunkDeleter, ReplicaClient};
use crate::topology::StaticTopology;

pub const TEST_MAX_BYTES: u64 = 1_000_000_000;

/// Primary test volume.
pub const VID: VolumeId = VolumeId(3);
/// Second local volume, used for chunks.
pub const CHUNK_VID: VolumeId = VolumeId(4);
/// Volume nobody serves locally.
pub const REMOTE_VID: VolumeId = VolumeId(9);

pub const MASTER: &str = "master:9333";

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

pub fn fid(volume_id: VolumeId, key: u64, cookie: u32) -> FileId {
    FileId::new(volume_id, NeedleKey(key), Cookie(cookie))
}

pub fn needle(key: u64, cookie: u32, data: &[u8]) -> Needle {
    Needle::new(NeedleKey(key), Cookie(cookie), data.to_vec())
}

/// Request path for `fid` in comma form.
pub fn path(fid: FileId) -> String {
    format!("/{fid}")
}

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// Records replicated mutations; peers can be made to fail or hang.
#[derive(Default)]
pub struct MockReplicaClient {
    pub writes: Mutex<Vec<(String, FileId)>>,
    pub deletes: Mutex<Vec<(String, FileId, u64)>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockReplicaClient {
    pub fn fail_peer(&self, peer: &str) {
        self.failing.lock().unwrap().insert(peer.to_string());
    }

    pub fn hang_peer(&self, peer: &str) {
        self.hanging.lock().unwrap().insert(peer.to_string());
    }

    /// Make every peer answer only after `delay`.
    pub fn delay_all(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    async fn answer(&self, peer: &str) -> Result<(), ReplicaError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let hang = self.hanging.lock().unwrap().contains(peer);
        if hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.lock().unwrap().contains(peer) {
            return Err(ReplicaError::Transport(format!("{peer} refused")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReplicaClient for MockReplicaClient {
    async fn replicate_write(
        &self,
        peer: &str,
        volume_id: VolumeId,
        needle: &Needle,
    ) -> Result<(), ReplicaError> {
        self.answer(peer).await?;
        self.writes
            .lock()
            .unwrap()
            .push((peer.to_string(), needle.file_id(volume_id)));
        Ok(())
    }

    async fn replicate_delete(
        &self,
        peer: &str,
        fid: FileId,
        last_modified: u64,
    ) -> Result<(), ReplicaError> {
        self.answer(peer).await?;
        self.deletes
            .lock()
            .unwrap()
            .push((peer.to_string(), fid, last_modified));
        Ok(())
    }
}

/// Records delegated chunk deletions; can be made to fail.
#[derive(Default)]
pub struct MockChunkDeleter {
    pub deleted: Mutex<Vec<(String, FileId)>>,
    pub fail: Mutex<bool>,
}

#[async_trait::async_trait]
impl ChunkDeleter for MockChunkDeleter {
    async fn delete_chunk(&self, master: &str, fid: FileId) -> Result<(), ReplicaError> {
        if *self.fail.lock().unwrap() {
            return Err(ReplicaError::Status {
                status: 500,
                body: "master unavailable".to_string(),
            });
        }
        self.deleted.lock().unwrap().push((master.to_string(), fid));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Node setup
// ---------------------------------------------------------------------------

/// A node plus handles on its mocks.
pub struct TestNode {
    pub node: VolumeNode,
    pub store: Arc<MemoryStore>,
    pub replicas: Arc<MockReplicaClient>,
    pub deleter: Arc<MockChunkDeleter>,
    pub stats: Arc<MutationStats>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        replica_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    }
}

/// A node serving [`VID`] and [`CHUNK_VID`] and replicating to `peers`.
pub async fn test_node(peers: &[&str]) -> TestNode {
    test_node_with(peers, test_config()).await
}

pub async fn test_node_with(peers: &[&str], config: EngineConfig) -> TestNode {
    let store = Arc::new(MemoryStore::new(TEST_MAX_BYTES));
    store.add_volume(VID).await;
    store.add_volume(CHUNK_VID).await;

    let topology = StaticTopology::new()
        .with_master(MASTER)
        .with_peers(peers.iter().copied());
    let replicas = Arc::new(MockReplicaClient::default());
    let deleter = Arc::new(MockChunkDeleter::default());
    let stats = Arc::new(MutationStats::new());

    let node = VolumeNode::new(config, store.clone(), Arc::new(topology), replicas.clone())
        .with_chunk_deleter(deleter.clone())
        .with_observer(stats.clone());

    TestNode {
        node,
        store,
        replicas,
        deleter,
        stats,
    }
}

/// Store chunks of the given sizes on [`CHUNK_VID`] and return a manifest
/// listing them in order.
pub async fn store_chunks(t: &TestNode, sizes: &[u64]) -> ChunkManifest {
    let mut chunks = Vec::new();
    let mut offset = 0;
    for (i, &size) in sizes.iter().enumerate() {
        let key = 100 + i as u64;
        let chunk = needle(key, 0xc0c0_0000 + i as u32, &test_data(size as usize));
        t.store.write(CHUNK_VID, &chunk).await.unwrap();
        chunks.push(ChunkInfo {
            fid: chunk.file_id(CHUNK_VID),
            offset,
            size,
        });
        offset += size;
    }
    ChunkManifest::new(chunks)
}

/// Store `manifest` as a manifest needle at `fid`.
pub async fn store_manifest(t: &TestNode, fid: FileId, manifest: &ChunkManifest) {
    let mut n = Needle::new(fid.key, fid.cookie, manifest.to_bytes().unwrap());
    n.is_manifest = true;
    t.store.write(fid.volume_id, &n).await.unwrap();
}
