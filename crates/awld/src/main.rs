//! `awld`: the Awl volume server daemon.
//!
//! Binary entrypoint that serves in-memory volumes over the HTTP mutation
//! API and replicates writes and deletes to peer volume servers.
//!
//! # Usage
//!
//! ```text
//! awld start --volume 1 --volume 2                    # serve two volumes
//! awld start -c awld.toml                             # start with a config file
//! awld start -l 127.0.0.1:8081 --peer 127.0.0.1:8080  # second replica
//! awld sign 3,01637037d6 --key k3y                    # print a write grant
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use awl_engine::{SignedGrantVerifier, StaticTopology, TracingObserver, VolumeNode, sign_grant};
use awl_http::{HttpChunkDeleter, HttpReplicaClient, VolumeServer, VolumeServerConfig};
use awl_store::{MemoryStore, VolumeStore};
use awl_types::{FileId, VolumeId};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "awld", version, about = "Awl volume server daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the volume server.
    Start {
        /// Override the HTTP listen address (e.g. "127.0.0.1:8081").
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,

        /// Volume id to serve. Can be specified multiple times.
        #[arg(long)]
        volume: Vec<u32>,

        /// Replica peer (`host:port`). Can be specified multiple times.
        #[arg(short, long)]
        peer: Vec<String>,

        /// Master address used for deleting remote chunks.
        #[arg(short, long)]
        master: Option<String>,

        /// Shared key for write grants.
        #[arg(long, env = "AWL_SIGNING_KEY")]
        signing_key: Option<String>,
    },

    /// Print the write grant for a file id.
    Sign {
        /// File id, e.g. `3,01637037d6`.
        fid: String,

        /// Shared key (defaults to `[security] signing_key`).
        #[arg(long, env = "AWL_SIGNING_KEY")]
        key: Option<String>,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start {
            listen_addr,
            volume,
            peer,
            master,
            signing_key,
        } => {
            // CLI args override config file values.
            if let Some(addr) = listen_addr {
                config.server.listen_addr = addr;
            }
            if !volume.is_empty() {
                config.storage.volumes = volume;
            }
            if !peer.is_empty() {
                config.cluster.peers = peer;
            }
            if master.is_some() {
                config.cluster.master = master;
            }
            if let Some(key) = signing_key {
                config.security.signing_key = key;
            }
            cmd_start(config).await
        }
        Commands::Sign { fid, key } => cmd_sign(&config, &fid, key.as_deref()),
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// awld start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    info!(
        listen_addr = %config.server.listen_addr,
        volumes = ?config.storage.volumes,
        ec_volumes = config.storage.ec_volumes.len(),
        peers = ?config.cluster.peers,
        master = ?config.cluster.master,
        "starting awld"
    );

    let node = build_node(&config).await?;

    let server = VolumeServer::new(VolumeServerConfig {
        node: Arc::new(node),
    });
    server
        .serve_with_shutdown(&config.server.listen_addr, shutdown_signal())
        .await
        .with_context(|| format!("failed to serve on {}", config.server.listen_addr))?;

    info!("awld stopped");
    Ok(())
}

/// Assemble the store, topology and outbound clients into a [`VolumeNode`].
async fn build_node(config: &CliConfig) -> Result<VolumeNode> {
    // --- Volumes ---
    let store = Arc::new(MemoryStore::new(config.storage.max_bytes));
    for &id in &config.storage.volumes {
        store.add_volume(VolumeId(id)).await;
    }
    for section in &config.storage.ec_volumes {
        let ec = section.to_ec_volume();
        info!(
            vid = ec.volume_id.0,
            data = ec.data_shards,
            parity = ec.parity_shards,
            shards = ec.total_shards(),
            "serving erasure-coded volume"
        );
        store.add_ec_volume(ec).await;
    }
    if config.storage.volumes.is_empty() && config.storage.ec_volumes.is_empty() {
        warn!("no volumes configured; every mutation will fail with unknown volume");
    }
    let capacity = store.capacity().await;
    info!(
        total_bytes = capacity.total_bytes,
        available_bytes = capacity.available_bytes,
        "in-memory store ready"
    );

    // --- Topology ---
    let mut topology =
        StaticTopology::new().with_peers(config.without_self(&config.cluster.peers));
    if let Some(master) = &config.cluster.master {
        topology = topology.with_master(master.clone());
    }
    for entry in &config.cluster.volume {
        topology = topology.with_volume(VolumeId(entry.id), config.without_self(&entry.replicas));
    }

    // --- Outbound clients ---
    let timeout = config.replica_timeout();
    let mut replicas = HttpReplicaClient::new(timeout).context("failed to build replica client")?;
    let mut deleter = HttpChunkDeleter::new(timeout).context("failed to build chunk deleter")?;
    if let Some(key) = config.signing_key() {
        replicas = replicas.with_signing_key(key);
        deleter = deleter.with_signing_key(key);
    }

    let engine = config.engine_config();
    if engine.fix_jpg_orientation {
        warn!("fix_jpg_orientation is set but no orientation transform is installed");
    }

    let mut node = VolumeNode::new(engine, store, Arc::new(topology), Arc::new(replicas))
        .with_chunk_deleter(Arc::new(deleter))
        .with_observer(Arc::new(TracingObserver));

    if let Some(key) = config.signing_key() {
        info!("write grants enforced");
        node = node.with_verifier(Arc::new(SignedGrantVerifier::new(key)));
    }

    Ok(node)
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(%e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(%e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received, draining in-flight requests");
}

// -----------------------------------------------------------------------
// awld sign
// -----------------------------------------------------------------------

fn cmd_sign(config: &CliConfig, fid: &str, key: Option<&str>) -> Result<()> {
    let fid: FileId = fid.parse().with_context(|| format!("invalid file id {fid:?}"))?;
    let Some(key) = key.or(config.signing_key()) else {
        bail!("no signing key: pass --key or set [security] signing_key");
    };
    println!("{}", sign_grant(key.as_bytes(), &fid.to_string()));
    Ok(())
}
