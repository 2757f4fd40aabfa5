//! Chunk manifests.
//!
//! A large object is uploaded as several ordinary needles (chunks) plus one
//! manifest needle whose payload is this JSON document. The manifest's
//! `size` is the user-visible size of the whole object.

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::{FileId, gzip};

/// Largest uncompressed manifest payload accepted by [`ChunkManifest::load`].
pub const MAX_MANIFEST_BYTES: u64 = 16 * 1024 * 1024;

/// One constituent of a chunked object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Where the chunk lives.
    pub fid: FileId,
    /// Byte offset of the chunk within the reassembled object.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub size: u64,
}

/// Payload of a manifest needle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Name of the reassembled object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Mime type of the reassembled object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Logical size of the reassembled object (sum of chunk sizes).
    pub size: u64,
    /// Constituent chunks.
    pub chunks: Vec<ChunkInfo>,
}

impl ChunkManifest {
    /// Build a manifest whose size is the sum of `chunks`.
    pub fn new(chunks: Vec<ChunkInfo>) -> Self {
        let size = chunks.iter().map(|c| c.size).sum();
        Self {
            name: None,
            mime: None,
            size,
            chunks,
        }
    }

    /// Decode a manifest needle payload.
    ///
    /// Gunzips first when `compressed`, up to [`MAX_MANIFEST_BYTES`].
    /// Chunks are returned sorted by offset. A declared size that disagrees
    /// with the chunk sizes is rejected.
    pub fn load(data: &[u8], compressed: bool) -> Result<Self, TypesError> {
        let raw;
        let json = if compressed {
            raw = gzip::decompress_limited(data, MAX_MANIFEST_BYTES)
                .map_err(|e| TypesError::Manifest(e.to_string()))?;
            raw.as_slice()
        } else {
            data
        };

        let mut manifest: ChunkManifest =
            serde_json::from_slice(json).map_err(|e| TypesError::Manifest(e.to_string()))?;

        let total: u64 = manifest.chunks.iter().map(|c| c.size).sum();
        if total != manifest.size {
            return Err(TypesError::Manifest(format!(
                "declared size {} does not match chunk total {total}",
                manifest.size
            )));
        }

        manifest.chunks.sort_by_key(|c| c.offset);
        Ok(manifest)
    }

    /// Encode as the JSON payload of a manifest needle.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypesError> {
        serde_json::to_vec(self).map_err(|e| TypesError::Manifest(e.to_string()))
    }

    /// File ids of all chunks, in offset order.
    pub fn chunk_ids(&self) -> Vec<FileId> {
        self.chunks.iter().map(|c| c.fid).collect()
    }
}
