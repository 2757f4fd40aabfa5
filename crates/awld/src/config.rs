//! TOML configuration for the Awl volume server daemon.
//!
//! Every section is optional; missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use awl_engine::EngineConfig;
use awl_types::{EcVolume, VolumeId};
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// HTTP listener and upload handling.
    pub server: ServerSection,
    /// Master and replica peers.
    pub cluster: ClusterSection,
    /// Volumes served by this node.
    pub storage: StorageSection,
    /// Replica fan-out tuning.
    pub replication: ReplicationSection,
    /// Write grants.
    pub security: SecuritySection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[server]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address the HTTP API binds to.
    pub listen_addr: String,
    /// Address other servers use to reach this one. Peers equal to it are
    /// never replicated to.
    pub public_addr: Option<String>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Normalize EXIF orientation of JPEG uploads.
    pub fix_jpg_orientation: bool,
    /// Gzip compressible uploads when that makes them smaller.
    pub compress_uploads: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            public_addr: None,
            max_upload_bytes: engine.max_upload_bytes,
            fix_jpg_orientation: engine.fix_jpg_orientation,
            compress_uploads: engine.compress_uploads,
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Master address, used to delete chunks held by other servers.
    pub master: Option<String>,
    /// Default replica peers (`"host:port"`) for every volume.
    pub peers: Vec<String>,
    /// Per-volume replica overrides (`[[cluster.volume]]`).
    pub volume: Vec<VolumePeers>,
}

/// One `[[cluster.volume]]` entry.
#[derive(Debug, Deserialize)]
pub struct VolumePeers {
    /// Volume the override applies to.
    pub id: u32,
    /// Replica peers for that volume.
    #[serde(default)]
    pub replicas: Vec<String>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Plain volumes to create at startup.
    pub volumes: Vec<u32>,
    /// Erasure-coded volumes to create at startup.
    pub ec_volumes: Vec<EcVolumeSection>,
    /// Total bytes the in-memory store may hold.
    pub max_bytes: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            ec_volumes: Vec::new(),
            max_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// One `[[storage.ec_volumes]]` entry.
#[derive(Debug, Deserialize)]
pub struct EcVolumeSection {
    /// Volume id.
    pub id: u32,
    /// Number of data shards.
    #[serde(default = "default_data_shards")]
    pub data_shards: u8,
    /// Number of parity shards.
    #[serde(default = "default_parity_shards")]
    pub parity_shards: u8,
}

fn default_data_shards() -> u8 {
    10
}

fn default_parity_shards() -> u8 {
    4
}

impl EcVolumeSection {
    /// The engine-side handle for this entry.
    pub fn to_ec_volume(&self) -> EcVolume {
        EcVolume::new(VolumeId(self.id), self.data_shards, self.parity_shards)
    }
}

/// `[replication]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    /// Per-peer deadline for a replica call.
    pub timeout_ms: u64,
    /// Chunk deletions in flight during a manifest cascade.
    pub cascade_parallelism: usize,
}

impl Default for ReplicationSection {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            cascade_parallelism: 1,
        }
    }
}

/// `[security]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    /// Shared key for write grants. Empty means every mutation is allowed.
    pub signing_key: String,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file.
    ///
    /// Without an explicit path, `~/.awl/awld.toml` is used when it exists;
    /// otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: CliConfig =
            toml::from_str(&content).with_context(|| format!("invalid {}", path.display()))?;
        Ok(config)
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Engine options derived from the `[server]` and `[replication]` sections.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_upload_bytes: self.server.max_upload_bytes,
            replica_timeout: self.replica_timeout(),
            cascade_parallelism: self.replication.cascade_parallelism.max(1),
            fix_jpg_orientation: self.server.fix_jpg_orientation,
            compress_uploads: self.server.compress_uploads,
        }
    }

    /// Per-peer replica deadline.
    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replication.timeout_ms)
    }

    /// The signing key, if grants are enforced.
    pub fn signing_key(&self) -> Option<&str> {
        Some(self.security.signing_key.as_str()).filter(|k| !k.is_empty())
    }

    /// Drop this server's own address from a peer list.
    pub fn without_self<'a>(&self, peers: &'a [String]) -> Vec<&'a str> {
        peers
            .iter()
            .map(String::as_str)
            .filter(|p| Some(*p) != self.server.public_addr.as_deref())
            .collect()
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".awl").join("awld.toml"))
}
