//! Turning an upload request into a [`Needle`].

use bytes::Bytes;

use awl_types::{FileId, Locator, Needle, VolumeId, gzip, now_secs};

use crate::error::EngineError;

/// Longest accepted file name, in bytes.
const MAX_NAME_LEN: usize = 255;

/// A raw upload as handed over by the protocol adapter.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Request path naming the target needle.
    pub path: String,
    /// Request body.
    pub body: Bytes,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// `Content-Encoding` header.
    pub content_encoding: Option<String>,
    /// Declared `Content-Length`, if any.
    pub content_length: Option<u64>,
    /// `name` query parameter.
    pub name: Option<String>,
    /// `cm=true`: the body is a chunk manifest.
    pub is_chunk_manifest: bool,
    /// `ts` query parameter: last-modified override in unix seconds.
    pub ts: Option<u64>,
}

impl UploadRequest {
    /// An upload of `body` to `path` with no headers or parameters.
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Set the `Content-Type`.
    pub fn with_content_type(mut self, mime: impl Into<String>) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    /// Mark the body as gzip-encoded.
    pub fn with_gzip(mut self) -> Self {
        self.content_encoding = Some("gzip".to_string());
        self
    }

    /// Set the `name` parameter.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the body as a chunk manifest.
    pub fn with_chunk_manifest(mut self) -> Self {
        self.is_chunk_manifest = true;
        self
    }

    /// Override the last-modified time.
    pub fn with_ts(mut self, ts: u64) -> Self {
        self.ts = Some(ts);
        self
    }
}

/// Knobs for [`decode`].
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Uploads above this size are rejected.
    pub max_upload_bytes: u64,
    /// Gzip compressible payloads that were sent uncompressed.
    pub compress_uploads: bool,
    /// Run JPEG payloads through the injected [`PayloadTransform`].
    pub fix_jpg_orientation: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: 256 * 1024 * 1024,
            compress_uploads: true,
            fix_jpg_orientation: false,
        }
    }
}

/// Rewrites a payload before it is fingerprinted, e.g. to normalize JPEG
/// orientation. Never changes the needle's identity.
pub trait PayloadTransform: Send + Sync {
    /// Return the transformed payload.
    fn transform(&self, data: Bytes) -> Bytes;
}

/// Result of a successful [`decode`].
#[derive(Debug, Clone)]
pub struct DecodedObject {
    /// Target file id.
    pub fid: FileId,
    /// Needle ready to store.
    pub needle: Needle,
    /// Uncompressed payload length.
    pub original_size: u64,
}

impl DecodedObject {
    /// Target volume.
    pub fn volume_id(&self) -> VolumeId {
        self.fid.volume_id
    }
}

/// Parse, validate and normalize an upload.
///
/// The size ceiling is checked against the declared length and the actual
/// body before anything is decompressed, then against the uncompressed
/// length of a gzip body.
pub fn decode(
    req: UploadRequest,
    opts: &DecodeOptions,
    transform: Option<&dyn PayloadTransform>,
) -> Result<DecodedObject, EngineError> {
    let limit = opts.max_upload_bytes;
    if let Some(declared) = req.content_length
        && declared > limit
    {
        return Err(EngineError::SizeLimitExceeded {
            size: declared,
            limit,
        });
    }
    let body_len = req.body.len() as u64;
    if body_len > limit {
        return Err(EngineError::SizeLimitExceeded {
            size: body_len,
            limit,
        });
    }

    let locator =
        Locator::from_path(&req.path).map_err(|e| EngineError::MalformedObject(e.to_string()))?;
    let fid = locator
        .file_id()
        .map_err(|e| EngineError::MalformedObject(e.to_string()))?;

    let name = req
        .name
        .filter(|n| !n.is_empty())
        .or(locator.filename.clone());
    if name.as_ref().is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::MalformedObject(format!(
            "file name longer than {MAX_NAME_LEN} bytes"
        )));
    }
    let ext = name
        .as_deref()
        .and_then(|n| n.rfind('.').map(|dot| n[dot..].to_string()))
        .or(locator.ext.clone());

    let mime = req
        .content_type
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty() && m != "application/octet-stream");

    let mut data = req.body;
    let mut compressed = req
        .content_encoding
        .as_deref()
        .is_some_and(|enc| enc.trim().eq_ignore_ascii_case("gzip"));

    let gunzipped_len = if compressed {
        let len = gzip::decompressed_len(&data, limit)
            .map_err(|e| EngineError::MalformedObject(format!("bad gzip body: {e}")))?;
        if len > limit {
            return Err(EngineError::SizeLimitExceeded { size: len, limit });
        }
        Some(len)
    } else {
        None
    };

    if opts.fix_jpg_orientation
        && !compressed
        && let Some(transform) = transform
        && is_jpeg(mime.as_deref(), ext.as_deref())
    {
        data = transform.transform(data);
    }
    let original_size = gunzipped_len.unwrap_or(data.len() as u64);

    if opts.compress_uploads
        && !compressed
        && !req.is_chunk_manifest
        && gzip::is_compressible(mime.as_deref(), ext.as_deref())
    {
        let packed = gzip::compress(&data).map_err(|e| EngineError::MalformedObject(e.to_string()))?;
        if packed.len() < data.len() {
            data = Bytes::from(packed);
            compressed = true;
        }
    }

    let needle = Needle {
        key: fid.key,
        cookie: fid.cookie,
        data,
        size: original_size,
        compressed,
        is_manifest: req.is_chunk_manifest,
        name,
        mime,
        last_modified: req.ts.unwrap_or_else(now_secs),
    };

    Ok(DecodedObject {
        fid,
        needle,
        original_size,
    })
}

fn is_jpeg(mime: Option<&str>, ext: Option<&str>) -> bool {
    mime.is_some_and(|m| m.eq_ignore_ascii_case("image/jpeg"))
        || ext.is_some_and(|e| e.eq_ignore_ascii_case(".jpg") || e.eq_ignore_ascii_case(".jpeg"))
}
