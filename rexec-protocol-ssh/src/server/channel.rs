use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;
use nix::sys::signal::Signal;
use rexec_common::{ChannelClosePolicy, ExecConfig, RexecError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::*;

use super::channel_writer::{ChannelOutput, ChannelWrite};
use super::process::{ManagedProcess, ProcessEvent, SPAWN_FAILURE_EXIT_CODE};
use crate::common::{PtyRequest, SSH_EXTENDED_DATA_STDERR};
use crate::request::ChannelRequest;

/// How the transport should answer a channel request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestReply {
    Success,
    Failure,
    /// Send nothing.
    Silent,
}

#[derive(Debug)]
pub enum ProcessState {
    NoProcess,
    Running(ManagedProcess),
    Terminated(u32),
}

/// Per-channel request handling and process bridging.
///
/// A channel runs at most one process over its lifetime. `K` identifies the
/// channel in the session-wide process event stream.
pub struct ServerChannel<K> {
    key: K,
    exec: Arc<ExecConfig>,
    process_events: UnboundedSender<(K, ProcessEvent)>,
    output: Box<dyn ChannelOutput>,
    pty: Option<PtyRequest>,
    state: ProcessState,
    peer_closed: bool,
}

impl<K> ServerChannel<K>
where
    K: Clone + Debug + Send + 'static,
{
    pub fn new(
        key: K,
        exec: Arc<ExecConfig>,
        process_events: UnboundedSender<(K, ProcessEvent)>,
        output: Box<dyn ChannelOutput>,
    ) -> Self {
        Self {
            key,
            exec,
            process_events,
            output,
            pty: None,
            state: ProcessState::NoProcess,
            peer_closed: false,
        }
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn pty(&self) -> Option<&PtyRequest> {
        self.pty.as_ref()
    }

    /// Nothing left to deliver: the peer is gone and no process is running.
    pub fn is_finished(&self) -> bool {
        self.peer_closed && !matches!(self.state, ProcessState::Running(_))
    }

    pub fn handle_request(&mut self, request: ChannelRequest) -> RequestReply {
        let kind = request.request_type().to_owned();
        let result = match request {
            ChannelRequest::Pty(request) => {
                self.handle_pty_request(request);
                Ok(RequestReply::Success)
            }
            ChannelRequest::Exec(command) => self
                .handle_exec_request(&command)
                .map(|_| RequestReply::Success),
            ChannelRequest::Signal(name) => self.handle_signal_request(&name),
            ChannelRequest::Unknown(name) => {
                debug!(channel=?self.key, request=%name, "Ignoring request");
                Ok(RequestReply::Silent)
            }
        };
        result.unwrap_or_else(|error| {
            if error.is_request_rejection() {
                warn!(channel=?self.key, request=%kind, %error, "Request denied");
            } else {
                error!(channel=?self.key, request=%kind, %error, "Request failed");
            }
            RequestReply::Failure
        })
    }

    fn handle_pty_request(&mut self, request: PtyRequest) {
        if !matches!(self.state, ProcessState::NoProcess) {
            debug!(channel=?self.key, "Terminal requested after exec, ignoring");
            return;
        }
        debug!(
            channel=?self.key,
            term=%request.term,
            cols=request.col_width,
            rows=request.row_height,
            modes=request.modes.len(),
            "Terminal requested"
        );
        self.pty = Some(request);
    }

    fn handle_exec_request(&mut self, command: &str) -> Result<(), RexecError> {
        if !matches!(self.state, ProcessState::NoProcess) {
            return Err(RexecError::DuplicateExec);
        }
        info!(channel=?self.key, %command, "Executing");
        match ManagedProcess::spawn(
            &self.exec,
            command,
            self.pty.as_ref(),
            self.key.clone(),
            self.process_events.clone(),
        ) {
            Ok(process) => {
                self.state = ProcessState::Running(process);
                Ok(())
            }
            Err(error) => {
                // Queued behind the failure reply, which the transport sends first.
                self.output.write(ChannelWrite::ExtendedData {
                    ext: SSH_EXTENDED_DATA_STDERR,
                    data: Bytes::from(format!("{error}\r\n")),
                });
                self.finish(SPAWN_FAILURE_EXIT_CODE);
                Err(error)
            }
        }
    }

    fn handle_signal_request(&mut self, name: &str) -> Result<RequestReply, RexecError> {
        if name.is_empty() {
            return Ok(RequestReply::Silent);
        }
        let ProcessState::Running(ref process) = self.state else {
            return Err(RexecError::NoProcess);
        };
        let signal = process.signal(name)?;
        info!(channel=?self.key, %signal, "Delivered signal");
        Ok(RequestReply::Silent)
    }

    pub fn handle_data(&mut self, data: Bytes) {
        match self.state {
            ProcessState::Running(ref process) => process.write_stdin(data),
            _ => debug!(channel=?self.key, len=data.len(), "No process to receive input"),
        }
    }

    pub fn handle_eof(&mut self) {
        if let ProcessState::Running(ref mut process) = self.state {
            process.close_stdin();
        }
    }

    pub fn handle_peer_close(&mut self) {
        self.peer_closed = true;
        if let ProcessState::Running(ref mut process) = self.state {
            process.close_stdin();
            match self.exec.on_channel_close {
                ChannelClosePolicy::KeepRunning => {
                    debug!(channel=?self.key, "Channel closed, process keeps running");
                }
                ChannelClosePolicy::Hangup => {
                    if let Err(error) = process.signal(Signal::SIGHUP.as_str()) {
                        debug!(channel=?self.key, %error, "Could not hang up process");
                    }
                }
            }
        }
    }

    pub fn handle_process_event(&mut self, event: ProcessEvent) {
        if self.peer_closed {
            if let ProcessEvent::Exited(code) = event {
                debug!(channel=?self.key, code, "Process exited after channel close");
                self.state = ProcessState::Terminated(code);
            }
            return;
        }
        match event {
            ProcessEvent::Stdout(data) => self.output.write(ChannelWrite::Data(data)),
            ProcessEvent::Stderr(data) => self.output.write(ChannelWrite::ExtendedData {
                ext: SSH_EXTENDED_DATA_STDERR,
                data,
            }),
            ProcessEvent::Exited(code) => {
                info!(channel=?self.key, code, "Process exited");
                self.finish(code);
            }
        }
    }

    fn finish(&mut self, code: u32) {
        self.state = ProcessState::Terminated(code);
        self.output.write(ChannelWrite::ExitStatus(code));
        self.output.write(ChannelWrite::Eof);
        self.output.write(ChannelWrite::Close);
    }
}
