//! Error types for parsing identifiers and manifests.

/// Errors raised while parsing or validating shared types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// The volume id is not a decimal `u32`.
    #[error("invalid volume id: {0:?}")]
    InvalidVolumeId(String),

    /// The key/cookie part of a file id could not be parsed.
    #[error("invalid file id {input:?}: {reason}")]
    InvalidFileId {
        /// The offending input.
        input: String,
        /// What was wrong with it.
        reason: &'static str,
    },

    /// The request path does not name a needle.
    #[error("invalid locator: {0:?}")]
    InvalidLocator(String),

    /// A chunk manifest could not be decoded or is inconsistent.
    #[error("malformed chunk manifest: {0}")]
    Manifest(String),

    /// A gzip payload inflates past the allowed size.
    #[error("decompressed payload exceeds {limit} bytes")]
    DecompressedTooLarge {
        /// Maximum uncompressed size.
        limit: u64,
    },

    /// Gzip encoding or decoding failed.
    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),
}
