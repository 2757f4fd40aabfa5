//! Error types for the engine.

use std::fmt;

use awl_store::StoreError;
use awl_types::{FileId, VolumeId};

/// Errors that can occur during a mutation.
///
/// A delete of an absent needle is not an error; it is reported as
/// [`DeleteOutcome::NotFound`](crate::DeleteOutcome::NotFound).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request carries no valid grant for this volume and locator.
    #[error("unauthorized")]
    Unauthorized,

    /// The request could not be decoded (bad locator, body, or metadata).
    #[error("malformed object: {0}")]
    MalformedObject(String),

    /// The upload is larger than the configured ceiling.
    #[error("upload of at least {size} bytes exceeds limit of {limit} bytes")]
    SizeLimitExceeded {
        /// Declared or observed size. Reading stops just past the limit, so
        /// for a streamed or gzip body this is a lower bound.
        size: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// Neither a plain nor an erasure-coded volume with this id is served here.
    #[error("unknown volume: {0}")]
    UnknownVolume(VolumeId),

    /// The cookie in the request does not match the stored needle.
    #[error("cookie mismatch for {0}")]
    CookieMismatch(FileId),

    /// A chunk manifest could not be decoded, or nests another manifest.
    #[error("malformed chunk manifest: {0}")]
    MalformedManifest(String),

    /// Deleting one chunk of a manifest failed; the manifest is kept.
    #[error("failed to delete chunk {chunk}: {source}")]
    CascadeDeletionFailed {
        /// The chunk whose deletion failed.
        chunk: FileId,
        /// Why it failed.
        source: Box<EngineError>,
    },

    /// At least one replica did not confirm the mutation.
    ///
    /// The local mutation has already been committed.
    #[error("replication failed: {}", join_failures(.failures))]
    ReplicationFailed {
        /// One entry per failed peer.
        failures: Vec<ReplicaFailure>,
    },

    /// The local storage backend failed.
    #[error("backend failure: {0}")]
    Backend(#[from] StoreError),
}

/// A peer that did not confirm a replicated mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaFailure {
    /// Peer address.
    pub peer: String,
    /// What went wrong.
    pub reason: String,
}

impl fmt::Display for ReplicaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.peer, self.reason)
    }
}

fn join_failures(failures: &[ReplicaFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by [`ReplicaClient`](crate::ReplicaClient) and
/// [`ChunkDeleter`](crate::ChunkDeleter) implementations.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    /// The peer could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with an unexpected status.
    #[error("peer returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The peer did not answer in time.
    #[error("timed out")]
    Timeout,
}
