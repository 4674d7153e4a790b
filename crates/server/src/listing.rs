use std::sync::Arc;

use axum::response::Html;
use axum::Extension;
use tracing::{debug, info, warn};

use crate::config::InspectFailurePolicy;
use crate::error::ServerError;
use crate::inspector::KeyIdentity;
use crate::storage::Folder;
use crate::AppState;

const PAGE: &str = include_str!("listing/index.html");

#[derive(Debug)]
struct KeyRow {
    file_name: String,
    identity: KeyIdentity,
}

/// Renders the upload forms, the key table and the archive digests.
///
/// Every key is inspected again on each request.
pub(crate) async fn index_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Html<String>, ServerError> {
    let storage = &state.storage;
    let file_names = storage.list_keys().await?;
    let mut rows = Vec::with_capacity(file_names.len());

    for file_name in file_names {
        let path = storage.key_path(&file_name);

        match state.inspector.inspect(&path).await {
            Ok(identity) => rows.push(KeyRow {
                file_name,
                identity,
            }),
            Err(err) if state.on_inspect_error == InspectFailurePolicy::Skip => {
                warn!(%file_name, error=%err, "Skipping key that could not be inspected");
            }
            Err(err) => {
                debug!(%file_name, "Aborting key listing");
                return Err(err.into());
            }
        }
    }

    let archive_sum = storage.archive(Folder::Keys).digest().await?;
    let signed_archive_sum = storage.archive(Folder::SignedKeys).digest().await?;

    info!(keys=rows.len(), "Rendered key listing");

    Ok(Html(render_page(
        &rows,
        archive_sum.as_deref().unwrap_or_default(),
        signed_archive_sum.as_deref().unwrap_or_default(),
    )))
}

fn render_page(rows: &[KeyRow], archive_sum: &str, signed_archive_sum: &str) -> String {
    PAGE.replace("{{ key_table }}", &render_table(rows))
        .replace("{{ key_ids }}", &render_key_ids(rows))
        .replace("{{ archive_sum }}", &escape_html(archive_sum))
        .replace("{{ signed_archive_sum }}", &escape_html(signed_archive_sum))
}

fn render_table(rows: &[KeyRow]) -> String {
    let body: String = rows
        .iter()
        .map(|row| {
            format!(
                "<tr><td><a href='/download/{}'>{}</a></td><td>{}</td><td>{}</td></tr>",
                urlencoding::encode(&row.file_name),
                escape_html(&row.file_name),
                escape_html(&row.identity.short_id),
                escape_html(&row.identity.fingerprint),
            )
        })
        .collect();

    format!(
        "<table class=\"table\"><tr><th>Filename</th><th>User ID</th><th>Key Fingerprint</th></tr>{body}</table>"
    )
}

fn render_key_ids(rows: &[KeyRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let ids: Vec<_> = rows
        .iter()
        .map(|row| escape_html(&row.identity.short_id))
        .collect();

    format!("gpg --recv-keys {}", ids.join(" "))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }

    escaped
}
