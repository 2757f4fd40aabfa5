//! HTTP adapter for the Awl volume server.
//!
//! Provides a [`VolumeServer`] that exposes the mutation path over an
//! axum-based HTTP API:
//!
//! - `POST /{locator}` and `PUT /{locator}`: write a needle
//! - `DELETE /{locator}`: delete a needle, cascading through chunk manifests
//!
//! A locator is `/<vid>,<fid>[.ext]`, `/<vid>/<fid>[.ext]` or
//! `/<vid>/<fid>/<filename>`. Query parameters: `name`, `cm=true`, `ts`,
//! `type=replicate`, `jwt`.
//!
//! Responses are JSON. See [`response`] for the status mapping.
//!
//! The crate also provides the outbound HTTP collaborators
//! ([`HttpReplicaClient`], [`HttpChunkDeleter`]).

mod client;
mod error;
mod handlers;
pub mod response;


use std::sync::Arc;

use awl_engine::VolumeNode;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;

pub use client::{HttpChunkDeleter, HttpReplicaClient};
pub use error::ApiError;

/// Shared application state for all handlers.
#[derive(Clone)]
pub(crate) struct AppState {
    /// The mutation engine.
    pub node: Arc<VolumeNode>,
}

/// Configuration for creating a [`VolumeServer`].
pub struct VolumeServerConfig {
    /// The engine to serve.
    pub node: Arc<VolumeNode>,
}

/// HTTP server backed by a [`VolumeNode`].
pub struct VolumeServer {
    router: Router,
}

impl VolumeServer {
    /// Create a new server with the given configuration.
    pub fn new(config: VolumeServerConfig) -> Self {
        let state = AppState { node: config.node };
        Self {
            router: Self::build_router(state),
        }
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route(
                "/{*locator}",
                post(handlers::write_handler)
                    .put(handlers::write_handler)
                    .delete(handlers::delete_handler),
            )
            // The write handler enforces the configured upload ceiling itself.
            .layer(DefaultBodyLimit::disable())
            .with_state(state)
    }

    /// Return the inner [`Router`] (useful for testing with `tower::ServiceExt`).
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on the given TCP address.
    pub async fn serve(self, addr: &str) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "volume server listening");
        axum::serve(listener, self.router).await
    }

    /// Serve with graceful shutdown triggered by the given future.
    ///
    /// When `shutdown` completes, the server stops accepting new connections
    /// and waits for in-flight requests to finish.
    pub async fn serve_with_shutdown(
        self,
        addr: &str,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr, "volume server listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
