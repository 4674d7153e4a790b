use std::collections::BTreeMap;
use std::fs::{read_to_string, write};
use std::net::SocketAddr;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{bail, eyre, Result as EyreResult, WrapErr};
use keyparty_server::config::{
    default_addrs, InspectFailurePolicy, InspectorConfig, StorageConfig, DEFAULT_MAX_UPLOAD_BYTES,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";

const EDITABLE_KEYS: &[(&str, &[&str])] = &[
    ("server.listen", &["0.0.0.0:5000", "127.0.0.1:8080,[::1]:8080"]),
    ("server.max_upload_bytes", &["2097152"]),
    ("storage.path", &["uploads", "/srv/keyparty"]),
    ("storage.allowed_extensions", &["asc", "asc,gpg"]),
    ("storage.ignored_files", &[".gitignore"]),
    ("inspector.binary", &["/usr/bin/gpg", "gpg1"]),
    ("inspector.args", &["--with-fingerprint"]),
    ("inspector.on_error", &["abort", "skip"]),
];

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    pub server: ServerConfig,

    pub storage: StorageConfig,

    #[serde(default)]
    pub inspector: InspectorConfig,
}

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ServerConfig {
    pub listen: Vec<SocketAddr>,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    #[must_use]
    pub const fn new(listen: Vec<SocketAddr>, max_upload_bytes: usize) -> Self {
        Self {
            listen,
            max_upload_bytes,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(default_addrs(), DEFAULT_MAX_UPLOAD_BYTES)
    }
}

const fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl ConfigFile {
    #[must_use]
    pub const fn new(
        server: ServerConfig,
        storage: StorageConfig,
        inspector: InspectorConfig,
    ) -> Self {
        Self {
            server,
            storage,
            inspector,
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse configuration from {path:?}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }

    /// Only write config file if changes are detected
    pub fn save_if_changed(&self, dir: &Utf8Path) -> EyreResult<bool> {
        let path = dir.join(CONFIG_FILE);
        let new_content = toml::to_string_pretty(self)?;

        let changed = read_to_string(&path).map_or(true, |existing| existing != new_content);

        if changed {
            write(&path, new_content)
                .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;
        }

        Ok(changed)
    }

    /// Base upload directory, with relative paths resolved against `home`.
    #[must_use]
    pub fn upload_dir(&self, home: &Utf8Path) -> Utf8PathBuf {
        home.join(&self.storage.path)
    }

    /// Editable config keys with example values
    #[must_use]
    pub fn editable_keys() -> BTreeMap<&'static str, &'static [&'static str]> {
        EDITABLE_KEYS.iter().copied().collect()
    }

    /// Get the value for a specific config key
    #[must_use]
    pub fn get_value(&self, key: &str) -> Option<String> {
        match key {
            "server.listen" => Some(join(&self.server.listen)),
            "server.max_upload_bytes" => Some(self.server.max_upload_bytes.to_string()),
            "storage.path" => Some(self.storage.path.to_string()),
            "storage.allowed_extensions" => Some(join(&self.storage.allowed_extensions)),
            "storage.ignored_files" => Some(join(&self.storage.ignored_files)),
            "inspector.binary" => Some(self.inspector.binary.to_string()),
            "inspector.args" => Some(join(&self.inspector.args)),
            "inspector.on_error" => Some(self.inspector.on_error.to_string()),
            _ => None,
        }
    }

    /// Set a config key from its textual form. Lists are comma-separated.
    pub fn set_value(&mut self, key: &str, value: &str) -> EyreResult<()> {
        match key {
            "server.listen" => {
                let listen = split(value)
                    .into_iter()
                    .map(|addr| {
                        addr.parse()
                            .wrap_err_with(|| format!("invalid listen address `{addr}`"))
                    })
                    .collect::<EyreResult<Vec<SocketAddr>>>()?;

                if listen.is_empty() {
                    bail!("at least one listen address is required");
                }

                self.server.listen = listen;
            }
            "server.max_upload_bytes" => {
                self.server.max_upload_bytes = value
                    .trim()
                    .parse()
                    .wrap_err_with(|| format!("invalid byte count `{value}`"))?;
            }
            "storage.path" => self.storage.path = value.trim().into(),
            "storage.allowed_extensions" => self.storage.allowed_extensions = split(value),
            "storage.ignored_files" => self.storage.ignored_files = split(value),
            "inspector.binary" => self.inspector.binary = value.trim().into(),
            "inspector.args" => self.inspector.args = split(value),
            "inspector.on_error" => {
                self.inspector.on_error = value
                    .trim()
                    .parse::<InspectFailurePolicy>()
                    .map_err(|err| eyre!(err))?;
            }
            _ => bail!("unknown config key `{key}`"),
        }

        Ok(())
    }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn split(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
