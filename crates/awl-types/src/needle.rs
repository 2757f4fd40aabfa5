//! The stored unit.

use bytes::Bytes;

use crate::{Cookie, FileId, NeedleKey, VolumeId};

/// A single stored content record: identity, payload, and metadata.
///
/// `size` is always the payload length before compression; `data` holds the
/// bytes exactly as stored (gzip-compressed when `compressed` is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Needle {
    /// Key within the volume.
    pub key: NeedleKey,
    /// Capability chosen when this version was written.
    pub cookie: Cookie,
    /// Stored payload bytes.
    pub data: Bytes,
    /// Logical (uncompressed) payload length.
    pub size: u64,
    /// Whether `data` is gzip-compressed.
    pub compressed: bool,
    /// Whether `data` is a [`ChunkManifest`](crate::ChunkManifest).
    pub is_manifest: bool,
    /// Original file name, if the uploader supplied one.
    pub name: Option<String>,
    /// Mime type, if the uploader supplied a meaningful one.
    pub mime: Option<String>,
    /// Unix seconds of the last mutation.
    pub last_modified: u64,
}

impl Needle {
    /// Create an uncompressed, unnamed needle holding `data`.
    pub fn new(key: NeedleKey, cookie: Cookie, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            key,
            cookie,
            size: data.len() as u64,
            data,
            compressed: false,
            is_manifest: false,
            name: None,
            mime: None,
            last_modified: now_secs(),
        }
    }

    /// Content fingerprint: first 8 bytes of `blake3(data)` in hex.
    ///
    /// Stable for identical stored bytes regardless of upload count.
    pub fn etag(&self) -> String {
        etag_of(&self.data)
    }

    /// The external address of this needle in `volume_id`.
    pub fn file_id(&self, volume_id: VolumeId) -> FileId {
        FileId::new(volume_id, self.key, self.cookie)
    }

    /// Whether `other` is a bit-identical re-upload of this needle.
    ///
    /// Same cookie, same fingerprint, same stored bytes. Metadata such as
    /// `last_modified` is not compared.
    pub fn is_unchanged(&self, other: &Needle) -> bool {
        self.cookie == other.cookie
            && self.compressed == other.compressed
            && self.etag() == other.etag()
            && self.data == other.data
    }
}

/// Fingerprint arbitrary bytes the same way [`Needle::etag`] does.
pub fn etag_of(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hex::encode(&hash.as_bytes()[..8])
}

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
