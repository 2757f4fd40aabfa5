//! [`VolumeNode`]: the volume server's mutation orchestrator.
//!
//! A `VolumeNode` owns the local volume store and the injected
//! collaborators, and exposes the authorized write and delete entry points
//! used by protocol adapters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use awl_store::VolumeStore;
use awl_types::{FileId, Locator, VolumeId};
use tracing::warn;

use crate::auth::{AllowAll, CapabilityVerifier, RequestContext};
use crate::decode::{DecodeOptions, PayloadTransform, UploadRequest, decode};
use crate::delete::DeleteOutcome;
use crate::error::EngineError;
use crate::observe::{MutationKind, Observer, TracingObserver};
use crate::replicate::{ChunkDeleter, ReplicaClient, ReplicationMode};
use crate::topology::Topology;
use crate::write::WriteOutcome;

/// Configuration for creating a [`VolumeNode`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Uploads above this size are rejected.
    pub max_upload_bytes: u64,
    /// Per-replica deadline for propagated mutations.
    pub replica_timeout: Duration,
    /// How many manifest chunks are deleted concurrently.
    pub cascade_parallelism: usize,
    /// Normalize JPEG orientation on upload.
    pub fix_jpg_orientation: bool,
    /// Gzip compressible payloads on upload.
    pub compress_uploads: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 256 * 1024 * 1024,
            replica_timeout: Duration::from_secs(5),
            cascade_parallelism: 1,
            fix_jpg_orientation: false,
            compress_uploads: true,
        }
    }
}

impl EngineConfig {
    /// Decoder settings derived from this configuration.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            max_upload_bytes: self.max_upload_bytes,
            compress_uploads: self.compress_uploads,
            fix_jpg_orientation: self.fix_jpg_orientation,
        }
    }
}

/// The mutation orchestrator of one volume server.
pub struct VolumeNode {
    /// Local volume storage.
    pub(crate) store: Arc<dyn VolumeStore>,
    /// Replica placement.
    pub(crate) topology: Arc<dyn Topology>,
    /// Outbound replication.
    pub(crate) replicas: Arc<dyn ReplicaClient>,
    /// Remote chunk deletion for cascades.
    pub(crate) chunk_deleter: Option<Arc<dyn ChunkDeleter>>,
    verifier: Arc<dyn CapabilityVerifier>,
    observer: Arc<dyn Observer>,
    transform: Option<Arc<dyn PayloadTransform>>,
    pub(crate) config: EngineConfig,
}

impl VolumeNode {
    /// Create a node with the given configuration and collaborators.
    ///
    /// Grants are not checked ([`AllowAll`]) and observations go to
    /// [`TracingObserver`] until replaced with the `with_*` methods.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VolumeStore>,
        topology: Arc<dyn Topology>,
        replicas: Arc<dyn ReplicaClient>,
    ) -> Self {
        Self {
            store,
            topology,
            replicas,
            chunk_deleter: None,
            verifier: Arc::new(AllowAll),
            observer: Arc::new(TracingObserver),
            transform: None,
            config,
        }
    }

    /// Require grants checked by `verifier`.
    pub fn with_verifier(mut self, verifier: Arc<dyn CapabilityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Delete chunks on foreign volumes through `deleter`.
    pub fn with_chunk_deleter(mut self, deleter: Arc<dyn ChunkDeleter>) -> Self {
        self.chunk_deleter = Some(deleter);
        self
    }

    /// Report calls and latencies to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Rewrite JPEG payloads with `transform` when orientation fixing is on.
    pub fn with_transform(mut self, transform: Arc<dyn PayloadTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Return a reference to the volume store.
    pub fn store(&self) -> &Arc<dyn VolumeStore> {
        &self.store
    }

    /// Return the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Request boundary
    // ------------------------------------------------------------------

    /// Authorize, decode and store an upload.
    pub async fn handle_write(
        &self,
        req: UploadRequest,
        mode: ReplicationMode,
        ctx: &RequestContext,
    ) -> Result<WriteOutcome, EngineError> {
        self.observer.record_call(MutationKind::Write);
        let started = Instant::now();

        let result = async {
            let fid = self.authorize(&req.path, ctx)?;
            // Replicated payloads were already transformed by the originator.
            let transform = match mode {
                ReplicationMode::Originate => self.transform.as_deref(),
                ReplicationMode::Replica => None,
            };
            let decoded = decode(req, &self.config.decode_options(), transform)?;
            self.write(fid.volume_id, &decoded.needle, mode).await
        }
        .await;

        self.observer
            .record_latency(MutationKind::Write, started.elapsed());
        result
    }

    /// Authorize and delete the needle named by `path`.
    ///
    /// `ts` overrides the deletion time stamped on the tombstone.
    pub async fn handle_delete(
        &self,
        path: &str,
        ts: Option<u64>,
        mode: ReplicationMode,
        ctx: &RequestContext,
    ) -> Result<DeleteOutcome, EngineError> {
        self.observer.record_call(MutationKind::Delete);
        let started = Instant::now();

        let result = async {
            let fid = self.authorize(path, ctx)?;
            self.delete(fid, ts, mode).await
        }
        .await;

        if let Err(EngineError::CookieMismatch(fid)) = &result {
            warn!(
                %fid,
                remote = ctx.remote_addr.as_deref().unwrap_or("-"),
                "delete rejected: cookie mismatch"
            );
        }

        self.observer
            .record_latency(MutationKind::Delete, started.elapsed());
        result
    }

    /// Parse the locator in `path` and check the caller's grant for it.
    ///
    /// Front ends call this before reading an upload body so that an
    /// unauthorized client is turned away without buffering it.
    pub fn authorize(&self, path: &str, ctx: &RequestContext) -> Result<FileId, EngineError> {
        let locator =
            Locator::from_path(path).map_err(|e| EngineError::MalformedObject(e.to_string()))?;
        let volume_id: VolumeId = locator
            .volume_id()
            .map_err(|e| EngineError::MalformedObject(e.to_string()))?;
        let fid = locator
            .file_id()
            .map_err(|e| EngineError::MalformedObject(e.to_string()))?;

        if !self
            .verifier
            .check(volume_id, &fid.to_string(), true, ctx)
        {
            return Err(EngineError::Unauthorized);
        }
        Ok(fid)
    }
}
