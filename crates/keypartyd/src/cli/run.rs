use clap::Parser;
use eyre::{bail, Result as EyreResult};
use keyparty_config::ConfigFile;
use keyparty_server::config::ServerConfig;
use keyparty_server::start;
use tracing::info;

use crate::cli::RootArgs;

/// Run the upload server
#[derive(Debug, Parser)]
pub struct RunCommand;

impl RunCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let home = root_args.home;

        if !ConfigFile::exists(&home) {
            bail!("Keyparty is not initialized in {:?}", home);
        }

        let config = ConfigFile::load(&home)?;

        let mut storage = config.storage.clone();
        storage.path = config.upload_dir(&home);

        info!(
            uploads=%storage.path,
            gpg=%config.inspector.binary,
            "Starting keyparty server"
        );

        start(ServerConfig::new(
            config.server.listen,
            config.server.max_upload_bytes,
            storage,
            config.inspector,
        ))
        .await
    }
}
