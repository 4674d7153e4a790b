use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ADDRS: [IpAddr; 1] = [IpAddr::V4(Ipv4Addr::UNSPECIFIED)];
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_KEYS_DIR: &str = "keys";
pub const DEFAULT_SIGNED_KEYS_DIR: &str = "signed_keys";
pub const DEFAULT_KEYS_ARCHIVE: &str = "csc_keys.zip";
pub const DEFAULT_SIGNED_KEYS_ARCHIVE: &str = "csc_signed_keys.zip";
pub const DEFAULT_GPG_BINARY: &str = "/usr/bin/gpg";

#[derive(Debug)]
#[non_exhaustive]
pub struct ServerConfig {
    pub listen: Vec<SocketAddr>,

    pub max_upload_bytes: usize,

    pub storage: StorageConfig,

    pub inspector: InspectorConfig,
}

impl ServerConfig {
    #[must_use]
    pub const fn new(
        listen: Vec<SocketAddr>,
        max_upload_bytes: usize,
        storage: StorageConfig,
        inspector: InspectorConfig,
    ) -> Self {
        Self {
            listen,
            max_upload_bytes,
            storage,
            inspector,
        }
    }
}

/// Where uploads land and which names the listing accepts.
///
/// `path` is the base upload directory. The two folders and the two
/// archives are resolved relative to it.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct StorageConfig {
    pub path: Utf8PathBuf,

    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,

    #[serde(default = "default_signed_keys_dir")]
    pub signed_keys_dir: String,

    #[serde(default = "default_keys_archive")]
    pub keys_archive: String,

    #[serde(default = "default_signed_keys_archive")]
    pub signed_keys_archive: String,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_ignored_files")]
    pub ignored_files: Vec<String>,
}

impl StorageConfig {
    #[must_use]
    pub fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            keys_dir: default_keys_dir(),
            signed_keys_dir: default_signed_keys_dir(),
            keys_archive: default_keys_archive(),
            signed_keys_archive: default_signed_keys_archive(),
            allowed_extensions: default_allowed_extensions(),
            ignored_files: default_ignored_files(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOAD_DIR.into())
    }
}

/// How the listing page reacts when a key file cannot be inspected.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum InspectFailurePolicy {
    /// Fail the whole page.
    #[default]
    Abort,
    /// Log the failure and leave the key out of the table.
    Skip,
}

impl Display for InspectFailurePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.pad("abort"),
            Self::Skip => f.pad("skip"),
        }
    }
}

impl FromStr for InspectFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown inspector failure policy `{other}`, expected `abort` or `skip`"
            )),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct InspectorConfig {
    #[serde(default = "default_gpg_binary")]
    pub binary: Utf8PathBuf,

    #[serde(default = "default_gpg_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub on_error: InspectFailurePolicy,
}

impl InspectorConfig {
    #[must_use]
    pub const fn new(binary: Utf8PathBuf, args: Vec<String>, on_error: InspectFailurePolicy) -> Self {
        Self {
            binary,
            args,
            on_error,
        }
    }
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self::new(
            default_gpg_binary(),
            default_gpg_args(),
            InspectFailurePolicy::default(),
        )
    }
}

#[must_use]
pub fn default_addrs() -> Vec<SocketAddr> {
    DEFAULT_ADDRS
        .into_iter()
        .map(|addr| SocketAddr::new(addr, DEFAULT_PORT))
        .collect()
}

fn default_keys_dir() -> String {
    DEFAULT_KEYS_DIR.to_owned()
}

fn default_signed_keys_dir() -> String {
    DEFAULT_SIGNED_KEYS_DIR.to_owned()
}

fn default_keys_archive() -> String {
    DEFAULT_KEYS_ARCHIVE.to_owned()
}

fn default_signed_keys_archive() -> String {
    DEFAULT_SIGNED_KEYS_ARCHIVE.to_owned()
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["asc".to_owned()]
}

fn default_ignored_files() -> Vec<String> {
    vec![".gitignore".to_owned()]
}

fn default_gpg_binary() -> Utf8PathBuf {
    DEFAULT_GPG_BINARY.into()
}

fn default_gpg_args() -> Vec<String> {
    vec!["--with-fingerprint".to_owned()]
}
