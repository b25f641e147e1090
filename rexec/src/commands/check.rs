use anyhow::Result;
use tracing::*;

use crate::config::load_config;

pub(crate) async fn command(cli: &crate::Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    if let Err(error) = rexec_protocol_ssh::load_host_keys(&config) {
        warn!(%error, "Host key is not usable, a new one is generated on the next run if missing");
    }
    info!("No problems found");
    Ok(())
}
