//! Telegram channel adapter.
//!
//! Receives messages by long polling `getUpdates` and replies through the
//! Bot API (`sendMessage`, `sendChatAction`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragbot_config::TelegramSettings;
use ragbot_core::channel::{Channel, ChannelId, ChannelMessage};
use ragbot_core::error::ChannelError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Pause after a failed poll before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Extra time the HTTP client waits on top of the long-poll timeout.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API client shared by the channel and its polling task.
#[derive(Clone)]
struct BotApi {
    token: String,
    api_url: String,
    poll_timeout: Duration,
    client: reqwest::Client,
}

impl BotApi {
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }

    /// Call a Bot API method and unwrap its `result`.
    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T, ChannelError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("{method}: {}", e.without_url())))?;
        let text = response
            .text()
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("{method}: {}", e.without_url())))?;

        parse_api_response(method, &text)
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, ChannelError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &request, Some(self.poll_timeout + POLL_GRACE))
            .await
    }
}

/// Telegram channel adapter.
pub struct TelegramChannel {
    id: ChannelId,
    api: BotApi,
    allowed_users: Vec<String>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api.api_url)
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout", &self.api.poll_timeout)
            .finish()
    }
}

impl TelegramChannel {
    pub fn new(token: impl Into<String>) -> Self {
        let defaults = TelegramSettings::default();
        let (shutdown, _) = watch::channel(false);
        Self {
            id: ChannelId("telegram".into()),
            api: BotApi {
                token: token.into(),
                api_url: defaults.api_url.trim_end_matches('/').to_string(),
                poll_timeout: Duration::from_secs(defaults.poll_timeout_secs),
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(120))
                    .build()
                    .expect("Failed to create HTTP client"),
            },
            allowed_users: defaults.allowed_users,
            shutdown,
        }
    }

    /// Build from the `[telegram]` config section.
    pub fn from_settings(settings: &TelegramSettings) -> Result<Self, ChannelError> {
        let token = settings
            .bot_token
            .clone()
            .ok_or_else(|| ChannelError::NotConfigured("telegram.bot_token".into()))?;

        Ok(Self::new(token)
            .with_api_url(&settings.api_url)
            .with_allowed_users(settings.allowed_users.clone())
            .with_poll_timeout(Duration::from_secs(settings.poll_timeout_secs)))
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api.api_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Allowed sender IDs. Empty denies everyone, `"*"` allows everyone.
    pub fn with_allowed_users(mut self, users: Vec<String>) -> Self {
        self.allowed_users = users;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.api.poll_timeout = timeout;
        self
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (tx, rx) = mpsc::channel(100);
        let api = self.api.clone();
        let channel_id = self.id.clone();
        // A previous stop() leaves the flag set.
        self.shutdown.send_replace(false);
        let mut shutdown = self.shutdown.subscribe();

        info!(poll_timeout_secs = api.poll_timeout.as_secs(), "Telegram channel starting");

        tokio::spawn(async move {
            let mut offset: Option<i64> = None;

            loop {
                let updates = tokio::select! {
                    _ = shutdown.changed() => break,
                    result = api.get_updates(offset) => result,
                };

                match updates {
                    Ok(updates) => {
                        offset = next_offset(offset, &updates);
                        for update in updates {
                            let Some(msg) = update_to_message(&channel_id, update) else {
                                continue;
                            };
                            if tx.send(Ok(msg)).await.is_err() {
                                debug!("Receiver dropped, stopping Telegram poller");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Telegram getUpdates failed");
                        if tx.send(Err(e)).await.is_err() {
                            return;
                        }
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                        }
                    }
                }
            }

            info!("Telegram poller stopped");
        });

        Ok(rx)
    }

    async fn send(
        &self,
        chat_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChannelError> {
        let request = SendMessageRequest {
            chat_id,
            text: content,
            reply_to_message_id: reply_to.and_then(|id| id.parse().ok()),
        };

        self.api
            .call::<_, serde_json::Value>("sendMessage", &request, None)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), ChannelError> {
        let request = ChatActionRequest {
            chat_id,
            action: "typing",
        };
        self.api
            .call::<_, bool>("sendChatAction", &request, None)
            .await
            .map(|_| ())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        if self.allowed_users.is_empty() {
            return false;
        }
        if self.allowed_users.iter().any(|u| u == "*") {
            return true;
        }
        self.allowed_users.iter().any(|u| u == sender_id)
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Telegram channel stopping");
        self.shutdown.send_replace(true);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        let me: BotUser = self.api.call("getMe", &serde_json::json!({}), None).await?;
        debug!(bot = %me.first_name, "Telegram getMe ok");
        Ok(me.is_bot)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to_message_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ChatActionRequest<'a> {
    chat_id: &'a str,
    action: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    date: i64,
    chat: Chat,
    from: Option<BotUser>,
    text: Option<String>,
    reply_to_message: Option<Box<TelegramMessage>>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    first_name: String,
}

fn parse_api_response<T>(method: &str, body: &str) -> Result<T, ChannelError>
where
    T: for<'de> Deserialize<'de>,
{
    let response: ApiResponse<T> = serde_json::from_str(body)
        .map_err(|e| ChannelError::InvalidPayload(format!("{method}: {e}")))?;

    if !response.ok {
        let description = response.description.unwrap_or_else(|| "unknown error".into());
        return Err(ChannelError::InvalidPayload(format!("{method}: {description}")));
    }

    response
        .result
        .ok_or_else(|| ChannelError::InvalidPayload(format!("{method}: missing result")))
}

/// The offset that acknowledges every update in `updates`.
fn next_offset(current: Option<i64>, updates: &[Update]) -> Option<i64> {
    updates
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .max(current)
}

/// Convert an update into a `ChannelMessage`.
///
/// Updates without a text message, and messages from bots, are skipped.
fn update_to_message(channel_id: &ChannelId, update: Update) -> Option<ChannelMessage> {
    let msg = update.message?;
    let content = msg.text?;

    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return None;
    }

    let (sender_id, sender_name) = match msg.from {
        Some(user) => (user.id.to_string(), Some(user.first_name)),
        None => (msg.chat.id.to_string(), None),
    };

    Some(ChannelMessage {
        channel_id: channel_id.clone(),
        message_id: msg.message_id.to_string(),
        sender_id,
        sender_name,
        content,
        chat_id: msg.chat.id.to_string(),
        timestamp: DateTime::from_timestamp(msg.date, 0).unwrap_or_else(Utc::now),
        reply_to_text: msg.reply_to_message.and_then(|replied| replied.text),
    })
}
