use std::io::Write;

use ansi_term::Colour;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufRead, Lines};
use tracing::*;

use super::error::SshClientError;
use crate::common::PtyRequest;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Bytes),
    Stderr(Bytes),
    /// A request sent with `want_reply` was accepted.
    Success,
    /// A request sent with `want_reply` was rejected.
    Failure,
    ExitStatus(u32),
    Eof,
    Closed,
}

/// Client half of a session channel used to run one command.
#[async_trait]
pub trait ExecChannel: Send {
    async fn request_pty(&mut self, request: &PtyRequest) -> Result<(), SshClientError>;
    async fn exec(&mut self, command: &str) -> Result<(), SshClientError>;
    /// `name` is given without the `SIG` prefix.
    async fn signal(&mut self, name: &str) -> Result<(), SshClientError>;
    async fn send_data(&mut self, data: &[u8]) -> Result<(), SshClientError>;
    async fn eof(&mut self) -> Result<(), SshClientError>;
    async fn close(&mut self) -> Result<(), SshClientError>;
    /// `None` once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputCommand {
    Quit,
    Signal(&'static str),
    Stdin(Bytes),
}

impl InputCommand {
    /// Escape commands must match exactly once surrounding whitespace is
    /// trimmed. Anything else is sent to stdin as typed, newline included.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "!q" => InputCommand::Quit,
            "!i" => InputCommand::Signal("INT"),
            "!t" => InputCommand::Signal("TERM"),
            "!k" => InputCommand::Signal("KILL"),
            _ => InputCommand::Stdin(Bytes::from(format!("{line}\n"))),
        }
    }
}

pub const HELP_BANNER: &str = "\
Type a line to send it to the remote process.
  !i  send SIGINT
  !t  send SIGTERM
  !k  send SIGKILL
  !q  close the channel and quit";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverExit {
    /// The user typed `!q`.
    Quit,
    /// The server closed the channel.
    RemoteClosed { exit_status: Option<u32> },
}

/// Relays local input lines to a remote command and prints what comes back.
pub struct InteractiveDriver<C, R, W> {
    channel: C,
    input: Lines<R>,
    output: W,
    colors: bool,
    exit_status: Option<u32>,
}

impl<C, R, W> InteractiveDriver<C, R, W>
where
    C: ExecChannel,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(channel: C, input: Lines<R>, output: W) -> Self {
        Self {
            channel,
            input,
            output,
            colors: false,
            exit_status: None,
        }
    }

    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    pub async fn run(
        mut self,
        command: &str,
        pty: Option<&PtyRequest>,
    ) -> Result<DriverExit, SshClientError> {
        if let Some(pty) = pty {
            debug!(term=%pty.term, "Requesting a terminal");
            self.channel.request_pty(pty).await?;
        }
        info!(%command, "Requesting exec");
        self.channel.exec(command).await?;
        writeln!(self.output, "{HELP_BANNER}")?;

        let mut input_open = true;
        loop {
            tokio::select! {
                line = self.input.next_line(), if input_open => {
                    match line? {
                        Some(line) => {
                            if let Some(exit) = self.handle_input(&line).await? {
                                return Ok(exit);
                            }
                        }
                        None => {
                            debug!("Input closed");
                            input_open = false;
                            self.channel.eof().await?;
                        }
                    }
                }
                event = self.channel.next_event() => {
                    match event {
                        Some(ChannelEvent::Closed) | None => {
                            let exit_status = self.exit_status;
                            self.print_tagged("CLOSED:", Colour::Cyan, match exit_status {
                                Some(code) => code.to_string(),
                                None => "no exit status".to_owned(),
                            })?;
                            return Ok(DriverExit::RemoteClosed { exit_status });
                        }
                        Some(event) => self.handle_event(event)?,
                    }
                }
            }
        }
    }

    async fn handle_input(&mut self, line: &str) -> Result<Option<DriverExit>, SshClientError> {
        match InputCommand::parse(line) {
            InputCommand::Quit => {
                info!("Closing channel");
                self.channel.close().await?;
                return Ok(Some(DriverExit::Quit));
            }
            InputCommand::Signal(name) => {
                info!(signal=%name, "Sending signal");
                self.channel.signal(name).await?;
            }
            InputCommand::Stdin(data) => self.channel.send_data(&data).await?,
        }
        Ok(None)
    }

    fn handle_event(&mut self, event: ChannelEvent) -> Result<(), SshClientError> {
        match event {
            ChannelEvent::Stdout(data) => self.print_tagged("STDOUT:", Colour::Green, lossy(&data)),
            ChannelEvent::Stderr(data) => self.print_tagged("STDERR:", Colour::Red, lossy(&data)),
            ChannelEvent::ExitStatus(code) => {
                debug!(code, "Exit status");
                self.exit_status = Some(code);
                Ok(())
            }
            ChannelEvent::Failure => {
                warn!("Request rejected by the server");
                self.print_tagged("FAILED:", Colour::Yellow, "request rejected".to_owned())
            }
            ChannelEvent::Success | ChannelEvent::Eof | ChannelEvent::Closed => Ok(()),
        }
    }

    fn print_tagged(
        &mut self,
        tag: &str,
        colour: Colour,
        text: String,
    ) -> Result<(), SshClientError> {
        let text = text.strip_suffix('\n').unwrap_or(&text);
        if self.colors {
            writeln!(self.output, "{} {text}", colour.paint(tag))?;
        } else {
            writeln!(self.output, "{tag} {text}")?;
        }
        Ok(())
    }
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::io::AsyncBufReadExt;

    use super::*;
    use crate::terminal_modes::{TerminalMode, TerminalOpcode};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum Sent {
        Pty(String),
        Exec(String),
        Signal(String),
        Data(Vec<u8>),
        Eof,
        Close,
    }

    /// Records what the driver sends and replays scripted server events.
    #[derive(Clone, Default)]
    pub(crate) struct FakeChannel {
        pub sent: Arc<Mutex<Vec<Sent>>>,
        pub events: Arc<Mutex<VecDeque<ChannelEvent>>>,
        /// Events are only released once this many items have been sent.
        pub hold_until_sent: usize,
    }

    impl FakeChannel {
        pub fn with_events(events: Vec<ChannelEvent>) -> Self {
            Self {
                events: Arc::new(Mutex::new(events.into())),
                ..Default::default()
            }
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn record(&self, item: Sent) {
            self.sent.lock().unwrap().push(item);
        }
    }

    #[async_trait]
    impl ExecChannel for FakeChannel {
        async fn request_pty(&mut self, request: &PtyRequest) -> Result<(), SshClientError> {
            self.record(Sent::Pty(request.term.clone()));
            Ok(())
        }

        async fn exec(&mut self, command: &str) -> Result<(), SshClientError> {
            self.record(Sent::Exec(command.to_owned()));
            Ok(())
        }

        async fn signal(&mut self, name: &str) -> Result<(), SshClientError> {
            self.record(Sent::Signal(name.to_owned()));
            Ok(())
        }

        async fn send_data(&mut self, data: &[u8]) -> Result<(), SshClientError> {
            self.record(Sent::Data(data.to_vec()));
            Ok(())
        }

        async fn eof(&mut self) -> Result<(), SshClientError> {
            self.record(Sent::Eof);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SshClientError> {
            self.record(Sent::Close);
            Ok(())
        }

        async fn next_event(&mut self) -> Option<ChannelEvent> {
            loop {
                let released = self.sent.lock().unwrap().len() >= self.hold_until_sent;
                let next = match released {
                    true => self.events.lock().unwrap().pop_front(),
                    false => None,
                };
                if next.is_some() {
                    return next;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
    }

    async fn drive(
        channel: FakeChannel,
        input: &'static [u8],
        pty: Option<&PtyRequest>,
    ) -> (DriverExit, String) {
        let mut output = vec![];
        let exit = InteractiveDriver::new(channel, input.lines(), &mut output)
            .run("do-work", pty)
            .await
            .unwrap();
        (exit, String::from_utf8(output).unwrap())
    }

    #[test]
    fn parses_escape_commands() {
        assert_eq!(InputCommand::parse("!q"), InputCommand::Quit);
        assert_eq!(InputCommand::parse("  !i \t"), InputCommand::Signal("INT"));
        assert_eq!(InputCommand::parse("!t"), InputCommand::Signal("TERM"));
        assert_eq!(InputCommand::parse("!k"), InputCommand::Signal("KILL"));
    }

    #[test]
    fn other_input_goes_to_stdin_verbatim() {
        assert_eq!(
            InputCommand::parse(" hello "),
            InputCommand::Stdin(Bytes::from_static(b" hello \n"))
        );
        assert_eq!(
            InputCommand::parse("!Q"),
            InputCommand::Stdin(Bytes::from_static(b"!Q\n"))
        );
        assert_eq!(
            InputCommand::parse("!q now"),
            InputCommand::Stdin(Bytes::from_static(b"!q now\n"))
        );
    }

    #[tokio::test]
    async fn quit_closes_without_sending_stdin() {
        let channel = FakeChannel::default();
        let (exit, _) = drive(channel.clone(), b"!q\n", None).await;
        assert_eq!(exit, DriverExit::Quit);
        assert_eq!(
            channel.sent(),
            vec![Sent::Exec("do-work".into()), Sent::Close]
        );
    }

    #[tokio::test]
    async fn forwards_signals_and_input_in_order() {
        let channel = FakeChannel::default();
        let (exit, _) = drive(channel.clone(), b"abc\n!i\n!t\n!k\n!q\n", None).await;
        assert_eq!(exit, DriverExit::Quit);
        assert_eq!(
            channel.sent(),
            vec![
                Sent::Exec("do-work".into()),
                Sent::Data(b"abc\n".to_vec()),
                Sent::Signal("INT".into()),
                Sent::Signal("TERM".into()),
                Sent::Signal("KILL".into()),
                Sent::Close,
            ]
        );
    }

    #[tokio::test]
    async fn pty_is_requested_before_exec() {
        let channel = FakeChannel::default();
        let pty = PtyRequest {
            term: "xterm".into(),
            col_width: 80,
            row_height: 24,
            pix_width: 0,
            pix_height: 0,
            modes: vec![TerminalMode::new(TerminalOpcode::TTY_OP_ISPEED, 38400)],
        };
        drive(channel.clone(), b"!q\n", Some(&pty)).await;
        assert_eq!(
            channel.sent()[..2],
            [Sent::Pty("xterm".into()), Sent::Exec("do-work".into())]
        );
    }

    #[tokio::test]
    async fn prints_tagged_output_until_remote_close() {
        let mut channel = FakeChannel::with_events(vec![
            ChannelEvent::Success,
            ChannelEvent::Stdout(Bytes::from_static(b"hi\n")),
            ChannelEvent::Stderr(Bytes::from_static(b"warn")),
            ChannelEvent::ExitStatus(3),
            ChannelEvent::Eof,
            ChannelEvent::Closed,
        ]);
        // Keep the events back until end of input has been signalled
        channel.hold_until_sent = 2;
        let (exit, output) = drive(channel.clone(), b"", None).await;
        assert_eq!(exit, DriverExit::RemoteClosed { exit_status: Some(3) });
        assert!(output.starts_with(HELP_BANNER));
        assert!(output.contains("STDOUT: hi\n"));
        assert!(output.contains("STDERR: warn\n"));
        assert!(output.ends_with("CLOSED: 3\n"));
        assert_eq!(channel.sent(), vec![Sent::Exec("do-work".into()), Sent::Eof]);
    }

    #[tokio::test]
    async fn rejected_exec_is_reported() {
        let channel = FakeChannel::with_events(vec![ChannelEvent::Failure, ChannelEvent::Closed]);
        let mut output = vec![];
        // Input that never ends
        let (_keep, reader) = tokio::io::duplex(64);
        let input = tokio::io::BufReader::new(reader).lines();
        let exit = InteractiveDriver::new(channel, input, &mut output)
            .run("nope", None)
            .await
            .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_eq!(exit, DriverExit::RemoteClosed { exit_status: None });
        assert!(output.contains("FAILED: request rejected"));
        assert!(output.ends_with("CLOSED: no exit status\n"));
    }
}
