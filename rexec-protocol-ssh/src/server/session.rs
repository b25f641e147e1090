use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures::Future;
use rexec_common::{ExecConfig, RexecError, SessionId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::*;

use super::channel::{RequestReply, ServerChannel};
use super::channel_writer::ChannelWriter;
use super::process::ProcessEvent;
use super::russh_handler::ServerHandlerEvent;
use crate::common::ServerChannelId;

enum Event {
    ServerHandler(ServerHandlerEvent),
    Process(ServerChannelId, ProcessEvent),
}

/// Owns every channel of one SSH connection.
///
/// Handler callbacks and process output are funneled into a single loop, so
/// channel state is never touched concurrently.
pub struct ServerSession {
    pub id: SessionId,
    remote_address: SocketAddr,
    exec: Arc<ExecConfig>,
    channel_writer: Option<ChannelWriter>,
    channels: HashMap<ServerChannelId, ServerChannel<ServerChannelId>>,
    handler_event_rx: UnboundedReceiver<ServerHandlerEvent>,
    process_tx: UnboundedSender<(ServerChannelId, ProcessEvent)>,
    process_rx: UnboundedReceiver<(ServerChannelId, ProcessEvent)>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} - {}]", self.id, self.remote_address)
    }
}

impl ServerSession {
    pub fn start(
        id: SessionId,
        remote_address: SocketAddr,
        exec: Arc<ExecConfig>,
        handler_event_rx: UnboundedReceiver<ServerHandlerEvent>,
    ) -> impl Future<Output = Result<()>> {
        let (process_tx, process_rx) = mpsc::unbounded_channel();
        let mut this = Self {
            id,
            remote_address,
            exec,
            channel_writer: None,
            channels: HashMap::new(),
            handler_event_rx,
            process_tx,
            process_rx,
        };
        let span = this.make_logging_span();

        async move {
            info!("New connection");
            while let Some(event) = this.get_next_event().await {
                match this.handle_event(event) {
                    Err(RexecError::SessionEnd) => break,
                    Err(error) => error!(?error, "Session event handler error"),
                    Ok(()) => (),
                }
            }
            this.close_all_channels();
            info!("Closed session");
            Ok(())
        }
        .instrument(span)
    }

    pub fn make_logging_span(&self) -> tracing::Span {
        let client_ip = self.remote_address.ip();
        info_span!("SSH", session=%self.id, %client_ip)
    }

    async fn get_next_event(&mut self) -> Option<Event> {
        tokio::select! {
            event = self.handler_event_rx.recv() => event.map(Event::ServerHandler),
            Some((channel, event)) = self.process_rx.recv() => Some(Event::Process(channel, event)),
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<(), RexecError> {
        match event {
            Event::ServerHandler(ServerHandlerEvent::Disconnect) => Err(RexecError::SessionEnd),
            Event::ServerHandler(event) => self.handle_server_handler_event(event),
            Event::Process(channel_id, event) => {
                let Some(channel) = self.channels.get_mut(&channel_id) else {
                    debug!(channel=%channel_id, ?event, "Process event for a forgotten channel");
                    return Ok(());
                };
                channel.handle_process_event(event);
                self.maybe_forget_channel(channel_id);
                Ok(())
            }
        }
    }

    fn handle_server_handler_event(&mut self, event: ServerHandlerEvent) -> Result<(), RexecError> {
        match event {
            ServerHandlerEvent::Authenticated(handle) => {
                self.channel_writer = Some(ChannelWriter::new(handle.0));
            }

            ServerHandlerEvent::ChannelOpenSession(channel_id, reply) => {
                let Some(ref writer) = self.channel_writer else {
                    let _ = reply.send(false);
                    return Err(RexecError::InconsistentState);
                };
                info!(channel=%channel_id, "Opening session channel");
                let channel = ServerChannel::new(
                    channel_id,
                    self.exec.clone(),
                    self.process_tx.clone(),
                    Box::new(writer.for_channel(channel_id)),
                );
                self.channels.insert(channel_id, channel);
                let _ = reply.send(true);
            }

            ServerHandlerEvent::ChannelRequest(channel_id, request, reply) => {
                let result = match self.channels.get_mut(&channel_id) {
                    Some(channel) => {
                        let kind = request.request_type();
                        debug!(channel=%channel_id, request=%kind, "Channel request");
                        channel.handle_request(request)
                    }
                    None => {
                        warn!(channel=%channel_id, "Request for an unknown channel");
                        RequestReply::Failure
                    }
                };
                let _ = reply.send(result);
            }

            ServerHandlerEvent::Data(channel_id, data, reply) => {
                if let Some(channel) = self.channels.get_mut(&channel_id) {
                    channel.handle_data(data);
                }
                let _ = reply.send(());
            }

            ServerHandlerEvent::ChannelEof(channel_id, reply) => {
                debug!(channel=%channel_id, "EOF");
                if let Some(channel) = self.channels.get_mut(&channel_id) {
                    channel.handle_eof();
                }
                let _ = reply.send(());
            }

            ServerHandlerEvent::ChannelClose(channel_id, reply) => {
                debug!(channel=%channel_id, "Closing channel");
                if let Some(channel) = self.channels.get_mut(&channel_id) {
                    channel.handle_peer_close();
                }
                self.maybe_forget_channel(channel_id);
                let _ = reply.send(());
            }

            ServerHandlerEvent::Disconnect => (),
        }
        Ok(())
    }

    fn maybe_forget_channel(&mut self, channel_id: ServerChannelId) {
        if self
            .channels
            .get(&channel_id)
            .is_some_and(|channel| channel.is_finished())
        {
            self.channels.remove(&channel_id);
            debug!(channel=%channel_id, "Channel released");
        }
    }

    fn close_all_channels(&mut self) {
        for (_, mut channel) in self.channels.drain() {
            channel.handle_peer_close();
        }
    }
}
