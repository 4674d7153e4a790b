use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::Multipart;
use axum::response::Redirect;
use axum::Extension;
use tokio::task;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::storage::Folder;
use crate::AppState;

/// One file part of a multipart form.
#[derive(Debug)]
struct UploadedFile {
    file_name: String,
    content: Bytes,
}

/// The file parts of a form, keyed by field name. Later parts with the
/// same field name replace earlier ones.
#[derive(Debug, Default)]
struct UploadForm {
    files: HashMap<String, UploadedFile>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart, fields: &[&str]) -> Result<Self, ServerError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().filter(|name| fields.contains(name)) else {
                continue;
            };
            let name = name.to_owned();
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let content = field.bytes().await?;

            drop(form.files.insert(name, UploadedFile { file_name, content }));
        }

        Ok(form)
    }

    fn take(&mut self, field: &str) -> Result<UploadedFile, ServerError> {
        self.files
            .remove(field)
            .ok_or_else(|| ServerError::Validation(format!("missing form field `{field}`")))
    }
}

/// Saves each file into `folder`, then appends all of them to the folder's
/// archive in one call.
///
/// The work runs on its own task, so a client that goes away mid-request
/// cannot leave a saved file without its archive entry.
async fn store(
    state: Arc<AppState>,
    folder: Folder,
    files: Vec<(String, Bytes)>,
) -> Result<(), ServerError> {
    task::spawn(async move {
        let storage = &state.storage;
        let mut entries = Vec::with_capacity(files.len());

        for (file_name, content) in &files {
            entries.push(storage.save(folder, file_name, content).await?);
        }

        storage.archive(folder).append(storage.root(), entries).await?;

        Ok::<_, ServerError>(())
    })
    .await?
}

fn home() -> Redirect {
    Redirect::to("/")
}

pub(crate) async fn redirect_home() -> Redirect {
    home()
}

/// Stores a public key and appends it to the keys archive.
///
/// Names without an allowed extension are dropped without telling the client.
pub(crate) async fn upload_key_handler(
    Extension(state): Extension<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Redirect, ServerError> {
    let mut form = UploadForm::read(multipart, &["file"]).await?;
    let file = form.take("file")?;

    let Some(file_name) = state.policy.accept(&file.file_name) else {
        debug!(file_name=%file.file_name, "Ignoring key upload with disallowed name");
        return Ok(home());
    };

    let size = file.content.len();
    store(state, Folder::Keys, vec![(file_name.clone(), file.content)]).await?;

    info!(%file_name, size, "Stored public key");

    Ok(home())
}

/// Stores a signed key together with its detached signature.
///
/// Both names must pass the extension check, otherwise nothing is written.
pub(crate) async fn upload_signed_keys_handler(
    Extension(state): Extension<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Redirect, ServerError> {
    let mut form = UploadForm::read(multipart, &["file", "signature"]).await?;
    let file = form.take("file")?;
    let signature = form.take("signature")?;

    let (Some(file_name), Some(signature_name)) = (
        state.policy.accept(&file.file_name),
        state.policy.accept(&signature.file_name),
    ) else {
        debug!(
            file_name=%file.file_name,
            signature_name=%signature.file_name,
            "Ignoring signed key upload with disallowed name"
        );
        return Ok(home());
    };

    store(
        state,
        Folder::SignedKeys,
        vec![
            (file_name.clone(), file.content),
            (signature_name.clone(), signature.content),
        ],
    )
    .await?;

    info!(%file_name, %signature_name, "Stored signed key");

    Ok(home())
}
