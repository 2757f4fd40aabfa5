//! Integration test: erasure-coded volumes.
//!
//! Once a volume is erasure-coded on a server, that server routes deletes to
//! the shard set and refuses writes; other replicas keep their plain copy.

use awl_engine::{DeleteOutcome, EngineError};
use awl_integration_tests::{TestCluster, test_data};
use awl_store::StoreError;
use awl_types::{ChunkInfo, ChunkManifest, FileId, VolumeId};

const FID: &str = "4,01637037d6";

async fn encoded_cluster() -> TestCluster {
    let c = TestCluster::new(2).await;
    c.add_volume(4, &[0, 1]).await;
    c.write(0, FID, &test_data(2048)).await.unwrap();
    c.encode_volume(0, 4).await;
    c
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_delete_goes_to_shard_set() {
    let c = encoded_cluster().await;
    let fid: FileId = FID.parse().unwrap();
    assert!(c.store(0).has_ec_needle(VolumeId(4), fid.key).await);

    let out = c.delete(0, FID).await.unwrap();
    assert_eq!(out, DeleteOutcome::Deleted { size: 2048 });
    assert!(!c.store(0).has_ec_needle(VolumeId(4), fid.key).await);

    // The plain copy on the encoding server and the other replica are untouched.
    assert!(c.has(0, FID).await);
    assert!(c.has(1, FID).await);

    // Deleting again finds nothing in the shard set.
    assert_eq!(c.delete(0, FID).await.unwrap(), DeleteOutcome::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_ec_cookie_mismatch() {
    let c = encoded_cluster().await;
    let err = c.delete(0, "4,01deadbeef").await.unwrap_err();
    assert!(matches!(err, EngineError::CookieMismatch(_)));

    let fid: FileId = FID.parse().unwrap();
    assert!(c.store(0).has_ec_needle(VolumeId(4), fid.key).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_ec_volume_refuses_writes() {
    let c = encoded_cluster().await;
    let err = c.write(0, "4,02637037d6", b"late").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Backend(StoreError::ReadOnlyVolume(VolumeId(4)))
    ));

    // The unencoded replica still takes writes (and tries to replicate them).
    let err = c.write(1, "4,02637037d6", b"late").await.unwrap_err();
    assert!(matches!(err, EngineError::ReplicationFailed { .. }));
    assert!(c.has(1, "4,02637037d6").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(10000)]
async fn test_cascade_reaches_ec_chunks() {
    let c = encoded_cluster().await;
    c.add_volume(1, &[0]).await;

    let chunk: FileId = FID.parse().unwrap();
    let manifest = ChunkManifest::new(vec![ChunkInfo {
        fid: chunk,
        offset: 0,
        size: 2048,
    }])
    .to_bytes()
    .unwrap();
    c.write_manifest(0, "1,0a00000001", &manifest).await.unwrap();

    let out = c.delete(0, "1,0a00000001").await.unwrap();
    assert_eq!(out.size(), 2048);
    assert!(!c.store(0).has_ec_needle(VolumeId(4), chunk.key).await);
}
