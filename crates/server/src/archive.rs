use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task;
use tracing::debug;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to access archive: {0}")]
    Io(#[from] io::Error),
    #[error("failed to update archive: {0}")]
    Zip(#[from] ZipError),
    #[error("archive writer task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// A zip file that only ever grows.
///
/// Entries are appended in place and never rewritten, so adding a name the
/// archive already holds leaves both entries in it. Appends to one archive
/// are serialized: the writer lock is held by the blocking task doing the
/// write, not by the caller's future.
#[derive(Debug)]
pub struct Archive {
    path: Utf8PathBuf,
    writer: Arc<Mutex<()>>,
}

impl Archive {
    #[must_use]
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            writer: Arc::new(Mutex::new(())),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.file_name().unwrap_or(self.path.as_str())
    }

    /// Appends each entry, in order, reading its content from `base.join(entry)`.
    ///
    /// The entry name stored in the archive is `entry` itself. Once started,
    /// the write runs to completion even if this future is dropped.
    pub async fn append(&self, base: &Utf8Path, entries: Vec<String>) -> Result<(), ArchiveError> {
        let guard = Arc::clone(&self.writer).lock_owned().await;

        let path = self.path.clone();
        let base = base.to_owned();

        task::spawn_blocking(move || {
            let result = append_entries(&path, &base, &entries);
            drop(guard);
            result
        })
        .await?
    }

    /// Hex-encoded SHA-256 of the whole archive, `None` if it was never written.
    pub async fn digest(&self) -> io::Result<Option<String>> {
        match tokio::fs::read(&self.path).await {
            Ok(content) => Ok(Some(hex::encode(Sha256::digest(&content)))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn append_entries(
    archive: &Utf8Path,
    base: &Utf8Path,
    entries: &[String],
) -> Result<(), ArchiveError> {
    let contents = entries
        .iter()
        .map(|entry| fs::read(base.join(entry)))
        .collect::<io::Result<Vec<_>>>()?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(archive)?;

    let mut writer = if file.metadata()?.len() == 0 {
        ZipWriter::new(file)
    } else {
        ZipWriter::new_append(file)?
    };

    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (entry, content) in entries.iter().zip(contents) {
        writer.start_file(entry.as_str(), options)?;
        writer.write_all(&content)?;

        debug!(archive=%archive, entry=%entry, size=content.len(), "Appended archive entry");
    }

    let _file = writer.finish()?;

    Ok(())
}
