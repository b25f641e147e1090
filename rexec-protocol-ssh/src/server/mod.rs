mod channel;
mod channel_writer;
mod process;
mod russh_handler;
mod session;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
pub use channel::{ProcessState, RequestReply, ServerChannel};
pub use channel_writer::{ChannelOutput, ChannelWrite, ChannelWriter};
pub use process::{ManagedProcess, ProcessEvent, SPAWN_FAILURE_EXIT_CODE};
use rexec_common::RexecConfig;
pub use russh_handler::{ServerHandler, ServerHandlerEvent};
pub use session::ServerSession;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::unbounded_channel;
use tracing::*;
use uuid::Uuid;

use crate::keys::load_host_keys;

pub async fn run_server(config: RexecConfig) -> Result<()> {
    let russh_config = Arc::new(russh::server::Config {
        auth_rejection_time: Duration::from_secs(1),
        inactivity_timeout: config.store.ssh.inactivity_timeout,
        keys: load_host_keys(&config)?,
        ..Default::default()
    });
    let exec = Arc::new(config.store.exec.clone());
    let address = *config.store.ssh.listen;

    let socket = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Could not listen on {address}"))?;
    info!(?address, "Listening");

    while let Ok((socket, remote_address)) = socket.accept().await {
        let id = Uuid::new_v4();
        let (event_tx, event_rx) = unbounded_channel();

        let session = ServerSession::start(id, remote_address, exec.clone(), event_rx);
        tokio::spawn(async move {
            if let Err(error) = session.await {
                error!(%error, session=%id, "Session failed");
            }
        });

        let handler = ServerHandler { id, event_tx };
        tokio::spawn(_run_stream(russh_config.clone(), socket, handler));
    }
    Ok(())
}

async fn _run_stream<R>(config: Arc<russh::server::Config>, socket: R, handler: ServerHandler)
where
    R: AsyncRead + AsyncWrite + Unpin + Send + Debug + 'static,
{
    let id = handler.id;
    let result = match russh::server::run_stream(config, socket, handler).await {
        Ok(running) => running.await,
        Err(error) => Err(error),
    };
    if let Err(error) = result {
        debug!(session=%id, %error, "Connection ended with an error");
    }
}
