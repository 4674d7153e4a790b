use std::net::SocketAddr;

use clap::Parser;
use eyre::{bail, Result as EyreResult};
use keyparty_config::ConfigFile;
use tracing::info;

use crate::cli::RootArgs;

/// Inspect or modify the configuration file
#[derive(Debug, Parser)]
pub struct ConfigCommand {
    /// Replace the listen addresses, may be repeated
    #[arg(long, value_name = "ADDR")]
    pub listen: Vec<SocketAddr>,

    /// Largest accepted request body, in bytes
    #[arg(long, value_name = "BYTES")]
    pub max_upload_bytes: Option<usize>,

    /// Set an editable key, e.g. `inspector.on_error=skip`
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_edit)]
    pub edits: Vec<(String, String)>,

    /// Print the resulting configuration
    #[arg(long)]
    pub print: bool,

    /// List editable keys with example values
    #[arg(long, exclusive = true)]
    pub hints: bool,
}

fn parse_edit(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{arg}`")),
    }
}

impl ConfigCommand {
    pub fn run(self, root_args: &RootArgs) -> EyreResult<()> {
        if self.hints {
            println!("Editable config keys and example values:");
            for (key, examples) in ConfigFile::editable_keys() {
                println!("  {key}: {examples:?}");
            }
            return Ok(());
        }

        let home = &root_args.home;

        if !ConfigFile::exists(home) {
            bail!("Keyparty is not initialized in {home:?}");
        }

        let mut config = ConfigFile::load(home)?;

        if !self.listen.is_empty() {
            config.server.listen = self.listen;
        }

        if let Some(max_upload_bytes) = self.max_upload_bytes {
            config.server.max_upload_bytes = max_upload_bytes;
        }

        for (key, value) in &self.edits {
            config.set_value(key, value)?;
        }

        if config.save_if_changed(home)? {
            info!(home=%home, "Saved configuration");
        }

        if self.print {
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Ok(())
    }
}
