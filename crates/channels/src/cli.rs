//! CLI channel: interactive terminal-based chat.
//!
//! Reads questions from stdin, writes replies to stdout.
//! Used for `ragbot chat` interactive mode.

use async_trait::async_trait;
use chrono::Utc;
use ragbot_core::channel::{Channel, ChannelId, ChannelMessage};
use ragbot_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Sender ID of the local terminal user.
pub const LOCAL_USER: &str = "local";

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    id: ChannelId,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            id: ChannelId("cli".into()),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap one line typed by the local user. `None` for blank lines.
pub fn line_to_message(channel_id: &ChannelId, seq: u64, line: &str) -> Option<ChannelMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    Some(ChannelMessage {
        channel_id: channel_id.clone(),
        message_id: seq.to_string(),
        sender_id: LOCAL_USER.into(),
        sender_name: Some("You".into()),
        content: line.to_string(),
        chat_id: "cli_session".into(),
        timestamp: Utc::now(),
        reply_to_text: None,
    })
}

fn is_exit_command(line: &str) -> bool {
    matches!(line.trim(), "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let channel_id = self.id.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();
            let mut seq = 0u64;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if is_exit_command(&line) {
                            break;
                        }
                        seq += 1;
                        let Some(msg) = line_to_message(&channel_id, seq, &line) else {
                            continue;
                        };
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(
        &self,
        _chat_id: &str,
        content: &str,
        _reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        println!("\n{content}\n");
        Ok(())
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true // CLI is always allowed (local user)
    }
}
