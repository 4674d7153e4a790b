use std::net::SocketAddr;

use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use keyparty_config::{ConfigFile, ServerConfig};
use keyparty_server::config::{
    default_addrs, InspectorConfig, StorageConfig, DEFAULT_GPG_BINARY, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_UPLOAD_DIR,
};
use keyparty_server::storage::Storage;
use tokio::fs::create_dir_all;
use tracing::info;

use crate::cli::RootArgs;

/// Initialize configuration and the upload directory layout
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Address to listen on, may be repeated
    #[arg(long, value_name = "ADDR")]
    pub listen: Vec<SocketAddr>,

    /// Base upload directory, relative to the home directory unless absolute
    #[arg(long, value_name = "PATH", default_value = DEFAULT_UPLOAD_DIR)]
    pub upload_dir: Utf8PathBuf,

    /// GPG binary used to read key fingerprints
    #[arg(long, value_name = "PATH", default_value = DEFAULT_GPG_BINARY)]
    pub gpg: Utf8PathBuf,

    /// Overwrite an existing configuration
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        let home = &root_args.home;

        if ConfigFile::exists(home) && !self.force {
            bail!("Configuration already exists in {home:?}, use --force to overwrite it");
        }

        create_dir_all(home)
            .await
            .wrap_err_with(|| format!("failed to create home directory {home:?}"))?;

        let listen = if self.listen.is_empty() {
            default_addrs()
        } else {
            self.listen
        };

        let mut inspector = InspectorConfig::default();
        inspector.binary = self.gpg;

        let config = ConfigFile::new(
            ServerConfig::new(listen, DEFAULT_MAX_UPLOAD_BYTES),
            StorageConfig::new(self.upload_dir),
            inspector,
        );

        config.save(home)?;

        let mut storage = config.storage.clone();
        storage.path = config.upload_dir(home);
        let storage = Storage::open(&storage).await?;

        info!(home=%home, uploads=%storage.root(), "Initialized keyparty");

        Ok(())
    }
}
