use bytes::Bytes;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::sync::mpsc;
use tracing::*;

use crate::common::ServerChannelId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelWrite {
    Data(Bytes),
    ExtendedData { ext: u32, data: Bytes },
    ExitStatus(u32),
    Eof,
    Close,
}

/// Outbound half of a single channel.
pub trait ChannelOutput: Send + Sync {
    fn write(&self, op: ChannelWrite);
}

/// Sequences channel writes and runs them in background to avoid lockups
#[derive(Clone)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<(ChannelId, ChannelWrite)>,
}

impl ChannelWriter {
    pub fn new(handle: Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(ChannelId, ChannelWrite)>();
        tokio::spawn(async move {
            while let Some((channel, op)) = rx.recv().await {
                let failed = match op {
                    ChannelWrite::Data(ref data) => handle
                        .data(channel, CryptoVec::from_slice(data))
                        .await
                        .is_err(),
                    ChannelWrite::ExtendedData { ext, ref data } => handle
                        .extended_data(channel, ext, CryptoVec::from_slice(data))
                        .await
                        .is_err(),
                    ChannelWrite::ExitStatus(code) => {
                        handle.exit_status_request(channel, code).await.is_err()
                    }
                    ChannelWrite::Eof => handle.eof(channel).await.is_err(),
                    ChannelWrite::Close => handle.close(channel).await.is_err(),
                };
                if failed {
                    debug!(%channel, ?op, "Channel write failed");
                }
            }
        });
        ChannelWriter { tx }
    }

    pub fn for_channel(&self, channel: ServerChannelId) -> ChannelSink {
        ChannelSink {
            writer: self.clone(),
            channel: channel.0,
        }
    }

    pub fn write(&self, channel: ChannelId, op: ChannelWrite) {
        let _ = self.tx.send((channel, op));
    }
}

pub struct ChannelSink {
    writer: ChannelWriter,
    channel: ChannelId,
}

impl ChannelOutput for ChannelSink {
    fn write(&self, op: ChannelWrite) {
        self.writer.write(self.channel, op);
    }
}
