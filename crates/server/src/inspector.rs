//! Key metadata extraction through an external GPG binary.
//!
//! The binary is run as `<binary> <args...> <key file>` and is expected to
//! print at least two lines:
//!
//! ```text
//! pub  1024D/DEADBEEF12345678 2021-01-01 Alice <alice@example.org>
//!       Key fingerprint = AAAA BBBB CCCC DDDD
//! ```
//!
//! The short ID is the first eight characters after the first `/` on the
//! first line; the fingerprint is everything between the first and second
//! ` = ` on the second line.

use core::fmt::Debug;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::string::FromUtf8Error;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::config::InspectorConfig;

const SHORT_ID_LEN: usize = 8;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyIdentity {
    pub short_id: String,
    pub fingerprint: String,
}

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to run `{binary}`: {source}")]
    Spawn {
        binary: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{binary}` exited with {status}: {stderr}")]
    Exit {
        binary: Utf8PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("inspector output is not valid UTF-8")]
    NotUtf8(#[from] FromUtf8Error),
    #[error("unexpected inspector output: {0}")]
    Malformed(&'static str),
}

/// Extracts the key identity from the inspector's standard output.
pub fn parse_fingerprint_output(output: &str) -> Result<KeyIdentity, InspectError> {
    let mut lines = output.split('\n');

    let key_line = lines.next().unwrap_or_default();
    let Some(fingerprint_line) = lines.next() else {
        return Err(InspectError::Malformed("missing fingerprint line"));
    };

    let Some(id_segment) = key_line.split('/').nth(1) else {
        return Err(InspectError::Malformed("key line has no `/`"));
    };

    let Some(fingerprint) = fingerprint_line.split(" = ").nth(1) else {
        return Err(InspectError::Malformed("fingerprint line has no ` = `"));
    };

    Ok(KeyIdentity {
        short_id: id_segment.chars().take(SHORT_ID_LEN).collect(),
        fingerprint: fingerprint.to_owned(),
    })
}

#[async_trait]
pub trait KeyInspector: Debug + Send + Sync {
    async fn inspect(&self, path: &Utf8Path) -> Result<KeyIdentity, InspectError>;
}

#[derive(Clone, Debug)]
pub struct GpgInspector {
    binary: Utf8PathBuf,
    args: Vec<String>,
}

impl GpgInspector {
    #[must_use]
    pub fn new(config: &InspectorConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl KeyInspector for GpgInspector {
    async fn inspect(&self, path: &Utf8Path) -> Result<KeyIdentity, InspectError> {
        debug!(binary=%self.binary, key=%path, "Inspecting key");

        let output = Command::new(&self.binary)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| InspectError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(InspectError::Exit {
                binary: self.binary.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        parse_fingerprint_output(&String::from_utf8(output.stdout)?)
    }
}
