mod batch;
mod channel_session;
mod driver;
mod error;
mod handler;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use batch::{run_batch, BatchReport, ChannelOpener, CommandOutcome};
pub use channel_session::RusshExecChannel;
pub use driver::{
    ChannelEvent, DriverExit, ExecChannel, InputCommand, InteractiveDriver, HELP_BANNER,
};
pub use error::SshClientError;
use handler::ClientHandler;
use russh::client::Handle;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PrivateKey;
use tracing::*;

pub enum ClientAuth {
    PublicKey(PrivateKey),
    Password(String),
}

/// An authenticated connection to a rexec server.
pub struct RemoteSession {
    handle: Handle<ClientHandler>,
}

impl RemoteSession {
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        auth: ClientAuth,
    ) -> Result<Self, SshClientError> {
        let config = russh::client::Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let handler = ClientHandler {
            host: host.to_owned(),
            port,
        };

        info!(%host, port, "Connecting");
        let mut handle = russh::client::connect(Arc::new(config), (host, port), handler).await?;

        let result = match auth {
            ClientAuth::PublicKey(key) => {
                let key = PrivateKeyWithHashAlg::new(Arc::new(key), None);
                handle.authenticate_publickey(user, key).await?
            }
            ClientAuth::Password(password) => handle.authenticate_password(user, password).await?,
        };
        if !result.success() {
            return Err(SshClientError::AuthenticationRejected(user.to_owned()));
        }
        info!(%user, "Authenticated");
        Ok(Self { handle })
    }

    pub async fn open_exec_channel(&self) -> Result<RusshExecChannel, SshClientError> {
        let channel = self.handle.channel_open_session().await?;
        debug!(channel=%channel.id(), "Opened session channel");
        Ok(RusshExecChannel::new(channel))
    }

    pub async fn disconnect(&self) -> Result<(), SshClientError> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelOpener for RemoteSession {
    type Channel = RusshExecChannel;

    async fn open_channel(&mut self) -> Result<RusshExecChannel, SshClientError> {
        self.open_exec_channel().await
    }
}
