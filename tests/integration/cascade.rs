//! Integration test: chunk manifest cascade across servers.
//!
//! Volume 1 (manifests) and volume 2 (chunks) live on nodes 0 and 1.
//! Volume 3 lives on node 2 only, so node 0 reaches its chunks through
//! the master.

use awl_engine::{DeleteOutcome, EngineConfig, EngineError};
use awl_integration_tests::{MASTER, TestCluster, test_config, test_data_seeded};
use awl_types::{ChunkInfo, ChunkManifest, FileId};

const MANIFEST: &str = "1,01637037d6";

async fn cluster_with(config: EngineConfig) -> TestCluster {
    let c = TestCluster::with_config(3, config, None).await;
    c.add_volume(1, &[0, 1]).await;
    c.add_volume(2, &[0, 1]).await;
    c.add_volume(3, &[2]).await;
    c
}

/// Write one chunk per `(vid, size)` pair and return the manifest bytes.
async fn write_chunks(c: &TestCluster, specs: &[(u32, u64)]) -> (Vec<FileId>, Vec<u8>) {
    let mut chunks = Vec::new();
    let mut fids = Vec::new();
    let mut offset = 0;
    for (i, &(vid, size)) in specs.iter().enumerate() {
        let fid: FileId = format!("{vid},{:x}0000c0de", i + 1).parse().unwrap();
        // Each chunk is written on a server that holds its volume.
        let writer = if vid == 3 { 2 } else { 0 };
        c.write(writer, &fid.to_string(), &test_data_seeded(size as usize, i as u32))
            .await
            .unwrap();
        chunks.push(ChunkInfo { fid, offset, size });
        fids.push(fid);
        offset += size;
    }
    let manifest = ChunkManifest::new(chunks).to_bytes().unwrap();
    (fids, manifest)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_cascade_removes_local_and_remote_chunks() {
    let c = cluster_with(test_config()).await;
    let (fids, manifest) = write_chunks(&c, &[(2, 1000), (3, 2000), (2, 500)]).await;
    c.write_manifest(0, MANIFEST, &manifest).await.unwrap();
    assert!(c.has(1, MANIFEST).await, "manifest replicated");

    let out = c.delete(0, MANIFEST).await.unwrap();
    assert_eq!(out, DeleteOutcome::Deleted { size: 3500 });

    for fid in &fids {
        for node in 0..c.len() {
            assert!(c.read(node, *fid).await.is_none(), "{fid} left on node {node}");
        }
    }
    assert!(!c.has(0, MANIFEST).await);
    assert!(!c.has(1, MANIFEST).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_unreachable_remote_chunk_keeps_manifest() {
    let c = cluster_with(test_config()).await;
    let (fids, manifest) = write_chunks(&c, &[(2, 100), (3, 200), (2, 300)]).await;
    c.write_manifest(0, MANIFEST, &manifest).await.unwrap();
    c.kill_node(2).await;

    let err = c.delete(0, MANIFEST).await.unwrap_err();
    match &err {
        EngineError::CascadeDeletionFailed { chunk, source } => {
            assert_eq!(*chunk, fids[1]);
            match source.as_ref() {
                EngineError::ReplicationFailed { failures } => {
                    assert_eq!(failures[0].peer, MASTER);
                }
                other => panic!("unexpected source {other}"),
            }
        }
        other => panic!("expected CascadeDeletionFailed, got {other}"),
    }

    // Chunks are deleted in order; the first went, the rest stayed.
    assert!(c.read(0, fids[0]).await.is_none());
    assert!(c.read(1, fids[0]).await.is_none());
    assert!(c.read(2, fids[1]).await.is_some());
    assert!(c.read(0, fids[2]).await.is_some());

    // The manifest record survives on every holder, so the delete can be retried.
    assert!(c.has(0, MANIFEST).await);
    assert!(c.has(1, MANIFEST).await);

    c.revive_node(2).await;
    let out = c.delete(0, MANIFEST).await.unwrap();
    assert_eq!(out.size(), 600);
    assert!(c.read(2, fids[1]).await.is_none());
    assert!(c.read(0, fids[2]).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(20000)]
async fn test_parallel_cascade_removes_every_chunk() {
    let config = EngineConfig {
        cascade_parallelism: 8,
        ..test_config()
    };
    let c = cluster_with(config).await;
    let specs: Vec<(u32, u64)> = (0..24)
        .map(|i| (if i % 3 == 0 { 3 } else { 2 }, 64 + i as u64))
        .collect();
    let expected: u64 = specs.iter().map(|(_, s)| s).sum();
    let (fids, manifest) = write_chunks(&c, &specs).await;
    c.write_manifest(0, MANIFEST, &manifest).await.unwrap();

    let out = c.delete(0, MANIFEST).await.unwrap();
    assert_eq!(out.size(), expected);
    for fid in &fids {
        for node in 0..c.len() {
            assert!(c.read(node, *fid).await.is_none(), "{fid} left on node {node}");
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_cascade_skips_chunks_already_gone() {
    let c = cluster_with(test_config()).await;
    let (fids, manifest) = write_chunks(&c, &[(2, 10), (2, 20)]).await;
    // Written on node 1, replicated to node 0.
    c.write_manifest(1, MANIFEST, &manifest).await.unwrap();

    // A missing chunk counts as deleted.
    c.delete(0, &fids[0].to_string()).await.unwrap();

    let out = c.delete(1, MANIFEST).await.unwrap();
    assert_eq!(out.size(), 30);
    assert!(c.read(0, fids[1]).await.is_none());
    assert!(!c.has(0, MANIFEST).await);
}
