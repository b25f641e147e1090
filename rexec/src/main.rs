mod commands;
mod config;
mod logging;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use logging::init_logging;

pub(crate) const DEFAULT_COMMAND: &str =
    r#"for i in {1..15}; do echo "Hello there: $i"; sleep 1; done"#;

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = "rexec.yaml", env = "REXEC_CONFIG")]
    config: PathBuf,
}

#[derive(clap::Args, Clone)]
pub(crate) struct ConnectArgs {
    /// Server host name [default: localhost]
    #[clap(long)]
    host: Option<String>,

    /// Server port [default: 2222]
    #[clap(long, short)]
    port: Option<u16>,

    /// User name to authenticate as [default: rexec]
    #[clap(long)]
    user: Option<String>,

    /// Private key file; a key is generated on first use when omitted
    #[clap(long)]
    key: Option<PathBuf>,

    /// Authenticate with a password instead of a key
    #[clap(long, env = "REXEC_PASSWORD")]
    password: Option<String>,
}

#[derive(clap::Subcommand)]
pub(crate) enum Commands {
    /// Run the exec server
    Run,
    /// Run a command remotely and relay stdin, signals and output interactively
    Exec {
        #[clap(flatten)]
        connect: ConnectArgs,

        /// Request a terminal before running the command
        #[clap(long, short)]
        tty: bool,

        #[clap(long, short, default_value = DEFAULT_COMMAND)]
        command: String,
    },
    /// Run several commands, one channel each
    Batch {
        #[clap(flatten)]
        connect: ConnectArgs,

        #[clap(long = "command", short = 'c', required = true)]
        commands: Vec<String>,
    },
    /// Validate config file
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    match &cli.command {
        Commands::Run => crate::commands::run::command(&cli).await,
        Commands::Exec {
            connect,
            tty,
            command,
        } => crate::commands::exec::command(&cli, connect, *tty, command).await,
        Commands::Batch { connect, commands } => {
            crate::commands::batch::command(&cli, connect, commands).await
        }
        Commands::Check => crate::commands::check::command(&cli).await,
    }
}
