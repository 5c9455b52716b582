//! Notification sources
//!
//! The scheduler consumes scene notifications one at a time from a
//! [`NotificationSource`]. The daemon reads JSON lines from stdin (the
//! station's message broker is bridged in front of the process); tests and
//! embedders feed notifications through a channel.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::warn;

use crate::types::SceneNotification;

#[async_trait]
pub trait NotificationSource: Send {
    fn source_name(&self) -> &str;

    /// The next notification, or `None` when the source is exhausted.
    async fn next_notification(&mut self) -> anyhow::Result<Option<SceneNotification>>;
}

/// JSON-lines notifications from standard input.
///
/// Unparsable lines are logged and skipped — one malformed message from the
/// broker must not stop the reception chain.
pub struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSource for StdinSource {
    fn source_name(&self) -> &str {
        "stdin"
    }

    async fn next_notification(&mut self) -> anyhow::Result<Option<SceneNotification>> {
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SceneNotification>(line) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => warn!("Discarding unparsable notification: {}", e),
            }
        }
        Ok(None)
    }
}

/// Notifications delivered over an in-process channel.
pub struct ChannelSource {
    receiver: mpsc::Receiver<SceneNotification>,
}

impl ChannelSource {
    pub fn new(receiver: mpsc::Receiver<SceneNotification>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl NotificationSource for ChannelSource {
    fn source_name(&self) -> &str {
        "channel"
    }

    async fn next_notification(&mut self) -> anyhow::Result<Option<SceneNotification>> {
        Ok(self.receiver.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_source_delivers_then_closes() {
        let (tx, rx) = mpsc::channel(4);
        let mut source = ChannelSource::new(rx);

        let msg: SceneNotification = serde_json::from_str(
            r#"{"platform_name": "noaa19",
                "start_time": "2021-01-19T14:08:26",
                "uri": "/data/hrpt_noaa19.l0",
                "sensor": "avhrr/3"}"#,
        )
        .unwrap();
        tx.send(msg).await.unwrap();
        drop(tx);

        let first = source.next_notification().await.unwrap();
        assert!(first.is_some());
        let second = source.next_notification().await.unwrap();
        assert!(second.is_none());
    }
}
