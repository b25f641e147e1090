use anyhow::Result;
use rexec_protocol_ssh::terminal_modes::{TerminalMode, TerminalOpcode};
use rexec_protocol_ssh::{DriverExit, InteractiveDriver, PtyRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::*;

use super::common::connect;
use crate::config::load_config;
use crate::ConnectArgs;

const TERMINAL_SPEED: u32 = 38400;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn local_pty_request() -> PtyRequest {
    PtyRequest {
        term: env_or("TERM", "xterm".to_owned()),
        col_width: env_or("COLUMNS", 80),
        row_height: env_or("LINES", 24),
        pix_width: 0,
        pix_height: 0,
        modes: vec![
            TerminalMode::new(TerminalOpcode::TTY_OP_ISPEED, TERMINAL_SPEED),
            TerminalMode::new(TerminalOpcode::TTY_OP_OSPEED, TERMINAL_SPEED),
        ],
    }
}

pub(crate) async fn command(
    cli: &crate::Cli,
    args: &ConnectArgs,
    tty: bool,
    command: &str,
) -> Result<()> {
    let config = load_config(&cli.config)?;
    let session = connect(&config, args).await?;
    let channel = session.open_exec_channel().await?;

    let pty = tty.then(local_pty_request);
    let input = BufReader::new(tokio::io::stdin()).lines();
    let exit = InteractiveDriver::new(channel, input, std::io::stdout())
        .with_colors(console::user_attended())
        .run(command, pty.as_ref())
        .await?;

    match exit {
        DriverExit::Quit => info!("Closed by user"),
        DriverExit::RemoteClosed { exit_status } => debug!(?exit_status, "Closed by server"),
    }
    if let Err(error) = session.disconnect().await {
        debug!(%error, "Disconnect failed");
    }
    Ok(())
}
