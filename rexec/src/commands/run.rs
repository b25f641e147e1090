use anyhow::Result;
use rexec_protocol_ssh::{generate_host_keys, run_server};
use tracing::*;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "rexec");

    let config = load_config(&cli.config)?;
    generate_host_keys(&config)?;

    if console::user_attended() {
        info!("--------------------------------------------");
        info!("rexec is now running.");
        info!("Accepting SSH connections on {}", config.store.ssh.listen);
        info!(
            "Commands run with: {} {}",
            config.store.exec.shell,
            config.store.exec.shell_args.join(" ")
        );
        info!("--------------------------------------------");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
        result = run_server(config) => {
            if let Err(error) = result {
                error!(?error, "SSH server error");
                return Err(error);
            }
        }
    }

    info!("Exiting");
    Ok(())
}
