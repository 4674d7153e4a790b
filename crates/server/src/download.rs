use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request};
use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Extension;
use camino::Utf8Path;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use crate::error::ServerError;
use crate::filename::is_plain_file_name;
use crate::storage::Folder;
use crate::AppState;

/// Serves one uploaded public key.
///
/// Only names of entries directly inside the keys folder are served.
pub(crate) async fn download_key_handler(
    Path(file_name): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> Result<Response, ServerError> {
    if !is_plain_file_name(&file_name) {
        return Err(ServerError::NotFound(file_name));
    }

    serve_attachment(&state.storage.key_path(&file_name), &file_name, request).await
}

pub(crate) async fn download_keys_handler(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> Result<Response, ServerError> {
    serve_archive(&state, Folder::Keys, request).await
}

pub(crate) async fn download_signed_keys_handler(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
) -> Result<Response, ServerError> {
    serve_archive(&state, Folder::SignedKeys, request).await
}

async fn serve_archive(
    state: &AppState,
    folder: Folder,
    request: Request,
) -> Result<Response, ServerError> {
    let archive = state.storage.archive(folder);

    serve_attachment(archive.path(), archive.file_name(), request).await
}

async fn serve_attachment(
    path: &Utf8Path,
    file_name: &str,
    request: Request,
) -> Result<Response, ServerError> {
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        return Err(ServerError::NotFound(file_name.to_owned()));
    }

    debug!(%path, status=%response.status(), "Serving download");

    let mut response = response.map(Body::new);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))?;

    drop(response.headers_mut().insert(header::CONTENT_DISPOSITION, disposition));

    Ok(response)
}
