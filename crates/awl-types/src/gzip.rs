//! Gzip helpers for needle payloads.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::TypesError;

/// Gzip-compress `data`.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, TypesError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Gunzip `data`.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, TypesError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Gunzip `data`, refusing to produce more than `limit` bytes.
pub fn decompress_limited(data: &[u8], limit: u64) -> Result<Vec<u8>, TypesError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(TypesError::DecompressedTooLarge { limit });
    }
    Ok(out)
}

/// Uncompressed length of `data`, counting at most `limit + 1` bytes.
///
/// A result above `limit` means the payload is larger than the limit; the
/// exact size is not computed.
pub fn decompressed_len(data: &[u8], limit: u64) -> Result<u64, TypesError> {
    let mut reader = GzDecoder::new(data).take(limit.saturating_add(1));
    Ok(io::copy(&mut reader, &mut io::sink())?)
}

/// Whether a payload of this mime type / extension is worth compressing.
pub fn is_compressible(mime: Option<&str>, ext: Option<&str>) -> bool {
    if let Some(mime) = mime {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("text/")
            || mime.contains("json")
            || mime.contains("xml")
            || mime.contains("javascript")
            || mime.contains("csv")
        {
            return true;
        }
    }
    matches!(
        ext.map(str::to_ascii_lowercase).as_deref(),
        Some(".txt" | ".json" | ".xml" | ".js" | ".css" | ".html" | ".htm" | ".csv" | ".svg")
    )
}
