use std::fmt::Debug;

use bytes::Bytes;
use rexec_common::SessionId;
use russh::keys::PublicKey;
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId, Pty, Sig};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::*;

use super::channel::RequestReply;
use crate::common::{PtyRequest, ServerChannelId};
use crate::request::{signal_wire_name, ChannelRequest};
use crate::terminal_modes::modes_from_russh;

pub struct HandleWrapper(pub Handle);

impl Debug for HandleWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandleWrapper")
    }
}

#[derive(Debug)]
pub enum ServerHandlerEvent {
    Authenticated(HandleWrapper),
    ChannelOpenSession(ServerChannelId, oneshot::Sender<bool>),
    ChannelRequest(ServerChannelId, ChannelRequest, oneshot::Sender<RequestReply>),
    Data(ServerChannelId, Bytes, oneshot::Sender<()>),
    ChannelEof(ServerChannelId, oneshot::Sender<()>),
    ChannelClose(ServerChannelId, oneshot::Sender<()>),
    Disconnect,
}

/// Translates russh callbacks into [ServerHandlerEvent]s for the session loop.
pub struct ServerHandler {
    pub id: SessionId,
    pub event_tx: UnboundedSender<ServerHandlerEvent>,
}

#[derive(thiserror::Error, Debug)]
pub enum ServerHandlerError {
    #[error("channel closed")]
    ChannelSend,
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),
}

impl ServerHandler {
    fn send_event(&self, event: ServerHandlerEvent) -> Result<(), ServerHandlerError> {
        self.event_tx
            .send(event)
            .map_err(|_| ServerHandlerError::ChannelSend)
    }

    async fn request(
        &mut self,
        channel: ChannelId,
        request: ChannelRequest,
        session: &mut Session,
    ) -> Result<(), ServerHandlerError> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::ChannelRequest(
            ServerChannelId(channel),
            request,
            tx,
        ))?;
        match rx.await.unwrap_or(RequestReply::Failure) {
            RequestReply::Success => session.channel_success(channel)?,
            RequestReply::Failure => session.channel_failure(channel)?,
            RequestReply::Silent => (),
        }
        Ok(())
    }

    async fn notify<F>(&mut self, make_event: F) -> Result<(), ServerHandlerError>
    where
        F: FnOnce(oneshot::Sender<()>) -> ServerHandlerEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.send_event(make_event(tx))?;
        let _ = rx.await;
        Ok(())
    }
}

impl russh::server::Handler for ServerHandler {
    type Error = ServerHandlerError;

    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        info!(session=%self.id, %user, algorithm=%key.algorithm(), "Accepting public key");
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        info!(session=%self.id, %user, "Accepting password");
        Ok(Auth::Accept)
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> Result<(), Self::Error> {
        self.send_event(ServerHandlerEvent::Authenticated(HandleWrapper(
            session.handle(),
        )))
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let (tx, rx) = oneshot::channel();
        self.send_event(ServerHandlerEvent::ChannelOpenSession(
            ServerChannelId(channel.id()),
            tx,
        ))?;
        Ok(rx.await.unwrap_or(false))
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let request = PtyRequest {
            term: term.to_owned(),
            col_width,
            row_height,
            pix_width,
            pix_height,
            modes: modes_from_russh(modes),
        };
        self.request(channel, ChannelRequest::Pty(request), session)
            .await
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Ok(command) = std::str::from_utf8(data) else {
            warn!(%channel, ?data, "Requested exec - invalid UTF-8");
            session.channel_failure(channel)?;
            return Ok(());
        };
        self.request(channel, ChannelRequest::Exec(command.to_owned()), session)
            .await
    }

    async fn signal(
        &mut self,
        channel: ChannelId,
        signal: Sig,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let name = signal_wire_name(&signal).into_owned();
        self.request(channel, ChannelRequest::Signal(name), session)
            .await
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.request(channel, ChannelRequest::Unknown("shell".into()), session)
            .await
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(%channel, subsystem=%name, "Subsystem requested");
        self.request(channel, ChannelRequest::Unknown("subsystem".into()), session)
            .await
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        _variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        debug!(%channel, name=%variable_name, "Environment variable requested");
        self.request(channel, ChannelRequest::Unknown("env".into()), session)
            .await
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let data = Bytes::copy_from_slice(data);
        self.notify(|tx| ServerHandlerEvent::Data(ServerChannelId(channel), data, tx))
            .await
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.notify(|tx| ServerHandlerEvent::ChannelEof(ServerChannelId(channel), tx))
            .await
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.notify(|tx| ServerHandlerEvent::ChannelClose(ServerChannelId(channel), tx))
            .await
    }
}

impl Drop for ServerHandler {
    fn drop(&mut self) {
        debug!(session=%self.id, "Dropped");
        let _ = self.event_tx.send(ServerHandlerEvent::Disconnect);
    }
}
