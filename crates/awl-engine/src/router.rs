//! Backend selection for a volume id.

use awl_store::VolumeStore;
use awl_types::{EcVolume, VolumeId};

use crate::error::EngineError;
use crate::node::VolumeNode;

/// Where a mutation for a volume is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// A plain volume served by the local store.
    Plain(VolumeId),
    /// The erasure-coded representation of the volume.
    ErasureCoded(EcVolume),
}

/// Pick the backend for `volume_id`.
///
/// The erasure-coded representation wins when both exist. Evaluated on every
/// request; nothing is cached.
pub async fn route(store: &dyn VolumeStore, volume_id: VolumeId) -> Result<Backend, EngineError> {
    if let Some(ec) = store.find_ec_volume(volume_id).await {
        return Ok(Backend::ErasureCoded(ec));
    }
    if store.has_volume(volume_id).await {
        return Ok(Backend::Plain(volume_id));
    }
    Err(EngineError::UnknownVolume(volume_id))
}

impl VolumeNode {
    /// Pick the backend for `volume_id` on this node's store.
    pub async fn route(&self, volume_id: VolumeId) -> Result<Backend, EngineError> {
        route(self.store.as_ref(), volume_id).await
    }
}
