//! Mutation coordination for an Awl volume server.
//!
//! The [`VolumeNode`] owns the local [`VolumeStore`](awl_store::VolumeStore)
//! and the injected collaborators (topology, replica client, chunk deleter,
//! capability verifier, observer) and exposes the write and delete paths.
//!
//! A mutation flows through:
//!
//! 1. the authorization gate ([`auth`]),
//! 2. the object decoder ([`decode`], writes only),
//! 3. the store router ([`router`]),
//! 4. the write or delete coordinator, which for chunk manifests runs the
//!    cascade ([`cascade`]) before removing the manifest itself,
//! 5. replica fan-out ([`replicate`]).
//!
//! Protocol adapters call [`VolumeNode::handle_write`] and
//! [`VolumeNode::handle_delete`] and map the result to their wire format.

pub mod auth;
pub mod cascade;
pub mod decode;
pub mod delete;
pub mod error;
pub mod node;
pub mod observe;
pub mod replicate;
pub mod router;
pub mod topology;
pub mod write;

pub use auth::{AllowAll, CapabilityVerifier, RequestContext, SignedGrantVerifier, sign_grant};
pub use decode::{DecodeOptions, DecodedObject, PayloadTransform, UploadRequest, decode};
pub use delete::DeleteOutcome;
pub use error::{EngineError, ReplicaError, ReplicaFailure};
pub use node::{EngineConfig, VolumeNode};
pub use observe::{MutationKind, MutationStats, Observer, TracingObserver};
pub use replicate::{ChunkDeleter, ReplicaClient, ReplicaOp, ReplicationMode};
pub use router::{Backend, route};
pub use topology::{StaticTopology, Topology};
pub use write::WriteOutcome;

#[cfg(test)]
mod tests;
