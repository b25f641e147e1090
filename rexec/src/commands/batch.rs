use anyhow::Result;
use rexec_protocol_ssh::run_batch;
use tracing::*;

use super::common::connect;
use crate::config::load_config;
use crate::ConnectArgs;

pub(crate) async fn command(
    cli: &crate::Cli,
    args: &ConnectArgs,
    commands: &[String],
) -> Result<()> {
    let config = load_config(&cli.config)?;
    let mut session = connect(&config, args).await?;

    let report = run_batch(&mut session, commands).await?;
    for outcome in &report.outcomes {
        let verdict = if outcome.succeeded() { "SUCCESS" } else { "FAILURE" };
        println!("{}: {verdict}", outcome.command);
    }

    if let Err(error) = session.disconnect().await {
        debug!(%error, "Disconnect failed");
    }
    std::process::exit(report.exit_code());
}
