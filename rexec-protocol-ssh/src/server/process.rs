use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rexec_common::{ExecConfig, RexecError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::*;

use crate::common::PtyRequest;
use crate::request::normalize_signal_name;

const READ_BUFFER_SIZE: usize = 8192;

/// Exit code reported when the command could not be started at all.
pub const SPAWN_FAILURE_EXIT_CODE: u32 = 127;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(Bytes),
    Stderr(Bytes),
    /// Sent once, after both output streams have been drained.
    Exited(u32),
}

/// An OS process bound to a channel.
///
/// Output and the final exit code are delivered as `(key, ProcessEvent)`
/// pairs so that one receiver can serve every process of a session.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: Pid,
    stdin_tx: Option<UnboundedSender<Bytes>>,
}

impl ManagedProcess {
    pub fn spawn<K>(
        config: &ExecConfig,
        command: &str,
        pty: Option<&PtyRequest>,
        key: K,
        events: UnboundedSender<(K, ProcessEvent)>,
    ) -> Result<Self, RexecError>
    where
        K: Clone + Send + 'static,
    {
        let mut cmd = Command::new(&config.shell);
        cmd.args(&config.shell_args)
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // No terminal device is allocated, the requested geometry is passed on as hints
        if let Some(pty) = pty {
            if !pty.term.is_empty() {
                cmd.env("TERM", &pty.term);
            }
            if pty.col_width > 0 && pty.row_height > 0 {
                cmd.env("COLUMNS", pty.col_width.to_string())
                    .env("LINES", pty.row_height.to_string());
            }
        }

        let mut child = cmd.spawn().map_err(RexecError::ProcessSpawn)?;
        let pid = child
            .id()
            .map(|pid| Pid::from_raw(pid as i32))
            .ok_or(RexecError::InconsistentState)?;
        debug!(%pid, %command, "Spawned process");

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        if let Some(stdin) = child.stdin.take() {
            tokio::spawn(forward_stdin(stdin, stdin_rx));
        }

        tokio::spawn(supervise(child, key, events));

        Ok(Self {
            pid,
            stdin_tx: Some(stdin_tx),
        })
    }

    /// Queues `data` for the process's stdin. Writes are not acknowledged.
    pub fn write_stdin(&self, data: Bytes) {
        match self.stdin_tx {
            Some(ref tx) => {
                if tx.send(data).is_err() {
                    debug!(pid=%self.pid, "Process stdin is gone, dropping input");
                }
            }
            None => debug!(pid=%self.pid, "Process stdin already closed, dropping input"),
        }
    }

    /// Closes stdin once the queued input has been written.
    pub fn close_stdin(&mut self) {
        self.stdin_tx = None;
    }

    /// Delivers a signal given by its wire name (`INT`, `SIGTERM`, ...).
    pub fn signal(&self, name: &str) -> Result<Signal, RexecError> {
        let name = normalize_signal_name(name);
        let signal =
            Signal::from_str(&name).map_err(|_| RexecError::UnsupportedSignal(name.to_string()))?;
        match kill(self.pid, signal) {
            Ok(()) => Ok(signal),
            Err(nix::errno::Errno::ESRCH) => Err(RexecError::NoProcess),
            Err(error) => Err(RexecError::other(error)),
        }
    }
}

async fn forward_stdin(mut stdin: ChildStdin, mut rx: UnboundedReceiver<Bytes>) {
    while let Some(data) = rx.recv().await {
        if let Err(error) = stdin.write_all(&data).await {
            debug!(%error, "Failed to write process stdin");
            return;
        }
        let _ = stdin.flush().await;
    }
}

async fn supervise<K: Clone + Send + 'static>(
    mut child: Child,
    key: K,
    events: UnboundedSender<(K, ProcessEvent)>,
) {
    let stdout = child.stdout.take().map(|stdout| {
        tokio::spawn(forward_output(
            stdout,
            key.clone(),
            events.clone(),
            ProcessEvent::Stdout,
        ))
    });
    let stderr = child.stderr.take().map(|stderr| {
        tokio::spawn(forward_output(
            stderr,
            key.clone(),
            events.clone(),
            ProcessEvent::Stderr,
        ))
    });

    for reader in [stdout, stderr].into_iter().flatten() {
        let _ = reader.await;
    }

    let code = match child.wait().await {
        Ok(status) => exit_code(status),
        Err(error) => {
            error!(%error, "Failed to wait for process");
            u32::MAX
        }
    };
    debug!(code, "Process exited");
    let _ = events.send((key, ProcessEvent::Exited(code)));
}

async fn forward_output<R, K>(
    mut reader: R,
    key: K,
    events: UnboundedSender<(K, ProcessEvent)>,
    wrap: fn(Bytes) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
    K: Clone,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        buf.reserve(READ_BUFFER_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if events.send((key.clone(), wrap(buf.split().freeze()))).is_err() {
                    break;
                }
            }
            Err(error) => {
                debug!(%error, "Failed to read process output");
                break;
            }
        }
    }
}

/// Processes killed by a signal report `128 + signo`, like a POSIX shell.
fn exit_code(status: ExitStatus) -> u32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code as u32,
        (None, Some(signal)) => 128 + signal as u32,
        (None, None) => u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> ExecConfig {
        ExecConfig {
            shell: "sh".into(),
            ..Default::default()
        }
    }

    async fn collect(rx: &mut UnboundedReceiver<(u32, ProcessEvent)>) -> (Vec<u8>, Vec<u8>, u32) {
        let mut stdout = vec![];
        let mut stderr = vec![];
        while let Some((key, event)) = rx.recv().await {
            assert_eq!(key, 7);
            match event {
                ProcessEvent::Stdout(data) => stdout.extend_from_slice(&data),
                ProcessEvent::Stderr(data) => stderr.extend_from_slice(&data),
                ProcessEvent::Exited(code) => return (stdout, stderr, code),
            }
        }
        panic!("event stream ended without an exit");
    }

    #[tokio::test]
    async fn separates_streams_and_reports_exit_code() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _process =
            ManagedProcess::spawn(&sh(), "printf out; printf err >&2; exit 3", None, 7, tx)
                .unwrap();
        let (stdout, stderr, code) = collect(&mut rx).await;
        assert_eq!(stdout, b"out");
        assert_eq!(stderr, b"err");
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn stdin_is_forwarded_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut process = ManagedProcess::spawn(&sh(), "cat", None, 7, tx).unwrap();
        process.write_stdin(Bytes::from_static(b"one\n"));
        process.write_stdin(Bytes::from_static(b"two\n"));
        process.close_stdin();
        let (stdout, _, code) = collect(&mut rx).await;
        assert_eq!(stdout, b"one\ntwo\n");
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn pty_geometry_is_exported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pty = PtyRequest {
            term: "vt100".into(),
            col_width: 100,
            row_height: 30,
            pix_width: 0,
            pix_height: 0,
            modes: vec![],
        };
        let _process = ManagedProcess::spawn(
            &sh(),
            "printf '%s %s %s' \"$TERM\" \"$COLUMNS\" \"$LINES\"",
            Some(&pty),
            7,
            tx,
        )
        .unwrap();
        let (stdout, _, _) = collect(&mut rx).await;
        assert_eq!(stdout, b"vt100 100 30");
    }

    #[tokio::test]
    async fn signal_names_are_normalized() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let process = ManagedProcess::spawn(&sh(), "exec sleep 5", None, 7, tx).unwrap();
        assert_eq!(process.signal("TERM").unwrap(), Signal::SIGTERM);
        let (_, _, code) = collect(&mut rx).await;
        assert_eq!(code, 128 + Signal::SIGTERM as u32);
    }

    #[tokio::test]
    async fn unknown_signal_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let process = ManagedProcess::spawn(&sh(), "exec sleep 5", None, 7, tx).unwrap();
        assert!(matches!(
            process.signal("NOPE"),
            Err(RexecError::UnsupportedSignal(ref name)) if name == "SIGNOPE"
        ));
        process.signal("SIGKILL").unwrap();
        let (_, _, code) = collect(&mut rx).await;
        assert_eq!(code, 128 + 9);
    }

    #[tokio::test]
    async fn missing_shell_fails_to_spawn() {
        let (tx, _rx) = mpsc::unbounded_channel::<(u32, ProcessEvent)>();
        let config = ExecConfig {
            shell: "/nonexistent/shell".into(),
            ..Default::default()
        };
        assert!(matches!(
            ManagedProcess::spawn(&config, "true", None, 7, tx),
            Err(RexecError::ProcessSpawn(_))
        ));
    }
}
