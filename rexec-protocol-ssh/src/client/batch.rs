use async_trait::async_trait;
use tracing::*;

use super::driver::{ChannelEvent, ExecChannel};
use super::error::SshClientError;

#[async_trait]
pub trait ChannelOpener {
    type Channel: ExecChannel;

    async fn open_channel(&mut self) -> Result<Self::Channel, SshClientError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub accepted: bool,
    pub exit_status: Option<u32>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.accepted && self.exit_status == Some(0)
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<CommandOutcome>,
}

impl BatchReport {
    pub fn any_succeeded(&self) -> bool {
        self.outcomes.iter().any(CommandOutcome::succeeded)
    }

    pub fn exit_code(&self) -> i32 {
        if self.any_succeeded() {
            0
        } else {
            1
        }
    }
}

/// Runs each command on its own channel, one after another.
pub async fn run_batch<O: ChannelOpener>(
    opener: &mut O,
    commands: &[String],
) -> Result<BatchReport, SshClientError> {
    let mut report = BatchReport::default();
    for command in commands {
        let channel = opener.open_channel().await?;
        let outcome = run_one(channel, command).await?;
        info!(
            command=%outcome.command,
            accepted=outcome.accepted,
            exit_status=?outcome.exit_status,
            "Command finished"
        );
        report.outcomes.push(outcome);
    }
    Ok(report)
}

async fn run_one<C: ExecChannel>(
    mut channel: C,
    command: &str,
) -> Result<CommandOutcome, SshClientError> {
    channel.exec(command).await?;
    channel.eof().await?;

    let mut outcome = CommandOutcome {
        command: command.to_owned(),
        accepted: false,
        exit_status: None,
    };
    let mut replied = false;
    while let Some(event) = channel.next_event().await {
        match event {
            ChannelEvent::Success if !replied => {
                replied = true;
                outcome.accepted = true;
            }
            ChannelEvent::Failure if !replied => {
                replied = true;
                warn!(%command, "Exec rejected");
            }
            ChannelEvent::ExitStatus(code) => outcome.exit_status = Some(code),
            ChannelEvent::Stdout(data) => debug!(%command, stdout=%String::from_utf8_lossy(&data)),
            ChannelEvent::Stderr(data) => debug!(%command, stderr=%String::from_utf8_lossy(&data)),
            ChannelEvent::Closed => break,
            _ => (),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::Bytes;

    use super::*;
    use crate::client::driver::tests::{FakeChannel, Sent};

    struct FakeOpener {
        scripts: VecDeque<Vec<ChannelEvent>>,
        opened: Vec<FakeChannel>,
    }

    impl FakeOpener {
        fn new(scripts: Vec<Vec<ChannelEvent>>) -> Self {
            Self {
                scripts: scripts.into(),
                opened: vec![],
            }
        }
    }

    #[async_trait]
    impl ChannelOpener for FakeOpener {
        type Channel = FakeChannel;

        async fn open_channel(&mut self) -> Result<FakeChannel, SshClientError> {
            let events = self.scripts.pop_front().unwrap_or_default();
            let channel = FakeChannel::with_events(events);
            self.opened.push(channel.clone());
            Ok(channel)
        }
    }

    fn commands(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn one_success_is_enough() {
        let mut opener = FakeOpener::new(vec![
            vec![ChannelEvent::Failure, ChannelEvent::Closed],
            vec![
                ChannelEvent::Success,
                ChannelEvent::Stdout(Bytes::from_static(b"ok")),
                ChannelEvent::ExitStatus(0),
                ChannelEvent::Eof,
                ChannelEvent::Closed,
            ],
        ]);
        let report = run_batch(&mut opener, &commands(&["bad", "good"])).await.unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.outcomes[0].succeeded());
        assert!(report.outcomes[1].succeeded());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            opener.opened[1].sent(),
            vec![Sent::Exec("good".into()), Sent::Eof]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure() {
        let mut opener = FakeOpener::new(vec![vec![
            ChannelEvent::Success,
            ChannelEvent::ExitStatus(2),
            ChannelEvent::Closed,
        ]]);
        let report = run_batch(&mut opener, &commands(&["false"])).await.unwrap();
        assert_eq!(report.outcomes[0].exit_status, Some(2));
        assert!(!report.any_succeeded());
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn empty_batch_fails() {
        let mut opener = FakeOpener::new(vec![]);
        let report = run_batch(&mut opener, &[]).await.unwrap();
        assert_eq!(report.exit_code(), 1);
    }
}
