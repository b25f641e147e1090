use async_trait::async_trait;
use bytes::Bytes;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tracing::*;

use super::driver::{ChannelEvent, ExecChannel};
use super::error::SshClientError;
use crate::common::{PtyRequest, SSH_EXTENDED_DATA_STDERR};
use crate::request::signal_from_wire_name;
use crate::terminal_modes::modes_to_russh;

/// [ExecChannel] over an open russh session channel.
pub struct RusshExecChannel {
    channel: Channel<Msg>,
}

impl RusshExecChannel {
    pub fn new(channel: Channel<Msg>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ExecChannel for RusshExecChannel {
    async fn request_pty(&mut self, request: &PtyRequest) -> Result<(), SshClientError> {
        let modes = modes_to_russh(&request.modes);
        self.channel
            .request_pty(
                true,
                &request.term,
                request.col_width,
                request.row_height,
                request.pix_width,
                request.pix_height,
                &modes,
            )
            .await?;
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<(), SshClientError> {
        self.channel.exec(true, command).await?;
        Ok(())
    }

    async fn signal(&mut self, name: &str) -> Result<(), SshClientError> {
        self.channel.signal(signal_from_wire_name(name)).await?;
        Ok(())
    }

    async fn send_data(&mut self, data: &[u8]) -> Result<(), SshClientError> {
        self.channel.data(data).await?;
        Ok(())
    }

    async fn eof(&mut self) -> Result<(), SshClientError> {
        self.channel.eof().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SshClientError> {
        self.channel.close().await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.channel.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(Bytes::copy_from_slice(&data)),
                ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    ChannelEvent::Stderr(Bytes::copy_from_slice(&data))
                }
                ChannelMsg::Success => ChannelEvent::Success,
                ChannelMsg::Failure => ChannelEvent::Failure,
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => ChannelEvent::Closed,
                msg => {
                    trace!(?msg, "Ignoring channel message");
                    continue;
                }
            };
            return Some(event);
        }
    }
}
