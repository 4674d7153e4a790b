use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use const_format::concatcp;
use eyre::Result as EyreResult;

use crate::defaults;

mod config;
mod init;
mod run;

use config::ConfigCommand;
use init::InitCommand;
use run::RunCommand;

pub const EXAMPLES: &str = r"
  # Initialize a new party directory
  $ keypartyd --home data/ init

  # Serve on a different port with a specific gpg binary
  $ keypartyd --home data/ config --listen 0.0.0.0:8080 --set inspector.binary=/usr/bin/gpg1

  # Run the server
  $ keypartyd --home data/ run
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  KEYPARTY_HOME    Directory for config and uploads\n",
    "  RUST_LOG         Log filter directives\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Config(ConfigCommand),
    Init(InitCommand),
    #[command(alias = "up")]
    Run(RunCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config and uploads
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_home_dir())]
    #[arg(env = "KEYPARTY_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Config(config) => config.run(&self.args),
            SubCommands::Init(init) => init.run(&self.args).await,
            SubCommands::Run(run) => run.run(self.args).await,
        }
    }
}
