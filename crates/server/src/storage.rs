use std::collections::BTreeSet;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use tokio::fs;
use tracing::{debug, info};

use crate::archive::Archive;
use crate::config::StorageConfig;

/// The two upload folders, each paired with its archive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Folder {
    Keys,
    SignedKeys,
}

/// On-disk layout under the base upload directory:
///
/// ```text
/// <base>/<keys_dir>/
/// <base>/<signed_keys_dir>/
/// <base>/<keys_archive>
/// <base>/<signed_keys_archive>
/// ```
#[derive(Debug)]
pub struct Storage {
    root: Utf8PathBuf,
    keys_dir: String,
    signed_keys_dir: String,
    ignored_files: BTreeSet<String>,
    keys_archive: Archive,
    signed_keys_archive: Archive,
}

impl Storage {
    /// Opens the layout, creating both folders if they are missing.
    pub async fn open(config: &StorageConfig) -> EyreResult<Self> {
        let root = config.path.clone();

        for dir in [&config.keys_dir, &config.signed_keys_dir] {
            let path = root.join(dir);

            fs::create_dir_all(&path)
                .await
                .wrap_err_with(|| format!("failed to create upload folder {path:?}"))?;
        }

        info!(root=%root, "Opened upload storage");

        Ok(Self {
            keys_archive: Archive::new(root.join(&config.keys_archive)),
            signed_keys_archive: Archive::new(root.join(&config.signed_keys_archive)),
            keys_dir: config.keys_dir.clone(),
            signed_keys_dir: config.signed_keys_dir.clone(),
            ignored_files: config.ignored_files.iter().cloned().collect(),
            root,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    #[must_use]
    pub fn archive(&self, folder: Folder) -> &Archive {
        match folder {
            Folder::Keys => &self.keys_archive,
            Folder::SignedKeys => &self.signed_keys_archive,
        }
    }

    fn dir_name(&self, folder: Folder) -> &str {
        match folder {
            Folder::Keys => &self.keys_dir,
            Folder::SignedKeys => &self.signed_keys_dir,
        }
    }

    #[must_use]
    pub fn folder_path(&self, folder: Folder) -> Utf8PathBuf {
        self.root.join(self.dir_name(folder))
    }

    /// Path of `file_name` inside the keys folder. The name is not checked.
    #[must_use]
    pub fn key_path(&self, file_name: &str) -> Utf8PathBuf {
        self.folder_path(Folder::Keys).join(file_name)
    }

    /// Writes `content` into the folder, replacing any file of the same name.
    ///
    /// Returns the archive entry name for the file, relative to the root.
    pub async fn save(&self, folder: Folder, file_name: &str, content: &[u8]) -> io::Result<String> {
        let path = self.folder_path(folder).join(file_name);

        fs::write(&path, content).await?;

        debug!(path=%path, size=content.len(), "Saved upload");

        Ok(format!("{}/{file_name}", self.dir_name(folder)))
    }

    /// Names of the regular files in the keys folder, sorted, ignored names left out.
    pub async fn list_keys(&self) -> io::Result<Vec<String>> {
        let mut entries = fs::read_dir(self.folder_path(Folder::Keys)).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };

            if !self.ignored_files.contains(&name) {
                names.push(name);
            }
        }

        names.sort_unstable();

        Ok(names)
    }
}
