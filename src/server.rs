// SPDX-FileCopyrightText: 2026 Quayside Contributors
// SPDX-License-Identifier: MIT

//! HTTP surface.
//!
//! One router, one shared state. The deploy endpoint accepts a multipart
//! upload and runs the publish pipeline; the file endpoints proxy reads and
//! writes against published repositories; the completion endpoint forwards
//! to the configured inference service. Every response is JSON, and every
//! failure body has the shape `{"success": false, "error": "..."}`.

pub mod handlers;

use crate::{
    config::Config,
    publish::Publisher,
    remote::{github::GithubClient, inference::InferenceClient, RemoteError},
};

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{io, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<Publisher>,
    pub host: Arc<GithubClient>,
    pub inference: Option<Arc<InferenceClient>>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire up clients and the pipeline from configuration.
    ///
    /// # Errors
    ///
    /// - Return [`ServerError::Remote`] if an HTTP client cannot be built.
    /// - Return [`ServerError::Workspace`] if the upload spool directory
    ///   cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        mkdirp::mkdirp(&config.workspace.upload_dir).map_err(|err| ServerError::Workspace {
            source: err,
            path: config.workspace.upload_dir.clone(),
        })?;

        let inference = match config.inference.as_ref() {
            Some(inference) => Some(Arc::new(InferenceClient::new(inference)?)),
            None => None,
        };

        Ok(Self {
            publisher: Arc::new(Publisher::from_config(config)?),
            host: Arc::new(GithubClient::new(&config.github)?),
            inference,
            upload_dir: config.workspace.upload_dir.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }
}

/// Assemble the router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/deploy", post(handlers::deploy))
        .route("/repos/:repo/files", get(handlers::list_files))
        .route(
            "/repos/:repo/files/*path",
            get(handlers::read_file).put(handlers::write_file),
        )
        .route("/complete", post(handlers::complete))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}

/// Bind and run the service until it is shut down.
///
/// # Errors
///
/// - Return [`ServerError::Bind`] if the listen address is unusable.
/// - Return [`ServerError::Serve`] if the listener dies while serving.
pub async fn serve(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    let router = build_router(state);

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|err| ServerError::Bind {
            source: err,
            addr: config.server.bind.clone(),
        })?;
    info!("listening on {}", config.server.bind);

    axum::serve(listener, router).await.map_err(ServerError::Serve)
}

/// All possible error types for the HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A remote client could not be constructed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The upload spool directory cannot be created.
    #[error("cannot create upload directory {path:?}")]
    Workspace { source: io::Error, path: PathBuf },

    /// The listen address cannot be bound.
    #[error("cannot bind {addr}")]
    Bind { source: io::Error, addr: String },

    /// The listener failed while serving.
    #[error("server terminated unexpectedly")]
    Serve(#[source] io::Error),
}

/// Friendly result alias :3
type Result<T, E = ServerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn state_and_router_build_from_default_config() {
        let mut config = Config::default();
        let scratch = tempfile::TempDir::new().unwrap();
        config.workspace.upload_dir = scratch.path().join("uploads");
        config.workspace.extract_dir = scratch.path().join("sites");

        let state = AppState::from_config(&config).unwrap();
        assert!(state.inference.is_none());
        assert!(config.workspace.upload_dir.is_dir());

        let _router = build_router(state);
    }
}
