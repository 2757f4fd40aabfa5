//! Shared types and identifiers for Awl.
//!
//! This crate defines the core vocabulary of the volume server:
//! identifiers ([`VolumeId`], [`NeedleKey`], [`Cookie`], [`FileId`]),
//! the stored unit ([`Needle`]), composite objects ([`ChunkManifest`]),
//! and the placement shapes consumed by the mutation path
//! ([`ReplicaSet`], [`EcVolume`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;
mod file_id;
pub mod gzip;
mod manifest;
mod needle;

pub use error::TypesError;
pub use file_id::{FileId, Locator};
pub use manifest::{ChunkInfo, ChunkManifest, MAX_MANIFEST_BYTES};
pub use needle::{Needle, now_secs};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty), $fmt:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Return the raw numeric value.
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, $fmt, self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(", $fmt, ")"), self.0)
            }
        }
    };
}

define_numeric_id!(
    /// Logical partition of the store. Rendered in decimal.
    VolumeId(u32),
    "{}"
);

define_numeric_id!(
    /// Fixed-width identifier of a needle within a volume. Rendered in hex.
    NeedleKey(u64),
    "{:x}"
);

define_numeric_id!(
    /// Random per-needle capability. Rendered as 8 hex digits.
    Cookie(u32),
    "{:08x}"
);

impl FromStr for VolumeId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypesError::InvalidVolumeId(s.to_string());
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        s.parse::<u32>().map(Self).map_err(|_| invalid())
    }
}

impl Cookie {
    /// Draw a fresh random cookie.
    pub fn random() -> Self {
        Self(rand::random())
    }
}

// ---------------------------------------------------------------------------
// Placement shapes
// ---------------------------------------------------------------------------

/// Peer servers that must hold a copy of a volume's needles.
///
/// Resolved by the topology collaborator and consumed read-only by the
/// write and delete coordinators. Never contains the local server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSet {
    /// Peer addresses (`host:port`).
    pub peers: Vec<String>,
}

impl ReplicaSet {
    /// Build a replica set from peer addresses.
    pub fn new(peers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            peers: peers.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether there is nobody to propagate to.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }
}

/// Handle to the erasure-coded representation of a volume.
///
/// When both a plain volume and an `EcVolume` exist for the same
/// [`VolumeId`], the erasure-coded one owns deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EcVolume {
    /// The volume this shard set encodes.
    pub volume_id: VolumeId,
    /// Number of data shards.
    pub data_shards: u8,
    /// Number of parity shards.
    pub parity_shards: u8,
}

impl EcVolume {
    /// Create a handle with the given shard geometry.
    pub fn new(volume_id: VolumeId, data_shards: u8, parity_shards: u8) -> Self {
        Self {
            volume_id,
            data_shards,
            parity_shards,
        }
    }

    /// Total shard count (data + parity).
    pub fn total_shards(&self) -> usize {
        self.data_shards as usize + self.parity_shards as usize
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
