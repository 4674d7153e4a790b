use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{Extension, Router};
use config::{InspectFailurePolicy, ServerConfig};
use eyre::Result as EyreResult;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod archive;
pub mod config;
mod download;
pub mod error;
pub mod filename;
pub mod inspector;
mod listing;
pub mod storage;
mod upload;

use filename::FilenamePolicy;
use inspector::{GpgInspector, KeyInspector};
use storage::Storage;

#[derive(Debug)]
#[non_exhaustive]
pub struct AppState {
    pub storage: Storage,
    pub policy: FilenamePolicy,
    pub inspector: Arc<dyn KeyInspector>,
    pub on_inspect_error: InspectFailurePolicy,
}

impl AppState {
    /// Opens the storage layout and inspects keys with the configured GPG binary.
    pub async fn new(config: &ServerConfig) -> EyreResult<Self> {
        let inspector = Arc::new(GpgInspector::new(&config.inspector));

        Self::with_inspector(config, inspector).await
    }

    pub async fn with_inspector(
        config: &ServerConfig,
        inspector: Arc<dyn KeyInspector>,
    ) -> EyreResult<Self> {
        Ok(Self {
            storage: Storage::open(&config.storage).await?,
            policy: FilenamePolicy::new(config.storage.allowed_extensions.iter().cloned()),
            inspector,
            on_inspect_error: config.inspector.on_error,
        })
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(
            "/",
            get(listing::index_handler).post(upload::upload_key_handler),
        )
        .route(
            "/signed_keys",
            get(upload::redirect_home).post(upload::upload_signed_keys_handler),
        )
        .route("/download", get(download::download_keys_handler))
        .route("/download_signed", get(download::download_signed_keys_handler))
        .route("/download/:file_name", get(download::download_key_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn start(config: ServerConfig) -> EyreResult<()> {
    let mut listeners = Vec::with_capacity(config.listen.len());

    for addr in &config.listen {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                info!(addr=%listener.local_addr()?, "Listening for HTTP requests");
                listeners.push(listener);
            }
            Err(err) => warn!(%addr, error=%err, "Failed to bind listener"),
        }
    }

    if listeners.is_empty() {
        eyre::bail!("Failed to bind any of the configured listen addresses");
    }

    let state = Arc::new(AppState::new(&config).await?);
    let app = router(state, config.max_upload_bytes);

    let mut set = tokio::task::JoinSet::new();

    for listener in listeners {
        let app = app.clone();
        drop(set.spawn(async move { axum::serve(listener, app).await }));
    }

    while let Some(result) = set.join_next().await {
        result??;
    }

    Ok(())
}
