//! MessageDispatcher: turns channel messages into answered replies.
//!
//! Per incoming message:
//!
//! 1. drop messages sent before the dispatcher started, and disallowed senders;
//! 2. answer `/start` and `/help` directly;
//! 3. require the trigger word (when one is configured) and strip it;
//! 4. answer the replied-to text instead when the message is a reply;
//! 5. show a typing indicator, answer through the sender's conversation,
//!    log the turn and send the reply.
//!
//! Only answered turns are logged; error replies are sent but not recorded.
//! Failures after the answer is produced are logged and never reach the user.

use chrono::{DateTime, Utc};
use ragbot_config::AppConfig;
use ragbot_core::channel::{Channel, ChannelMessage};
use ragbot_core::error::ChannelError;
use ragbot_core::transcript::TurnLog;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{Reply, ReplyKind};
use crate::registry::OrchestratorRegistry;

/// Transport-facing behavior, built from config.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Required message prefix. Empty answers every message.
    pub trigger_word: String,
    pub start_reply: String,
    pub help_reply: String,
    pub error_reply: String,
    /// Upper bound on one answer
    pub answer_timeout: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout = config.bot.answer_timeout_secs;
        Self {
            trigger_word: config.bot.trigger_word.clone(),
            start_reply: config.bot.start_reply.clone(),
            help_reply: config.bot.help_reply.clone(),
            error_reply: config.bot.error_reply.clone(),
            answer_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        }
    }

    /// Same settings with no trigger word (every message is a question).
    pub fn without_trigger(mut self) -> Self {
        self.trigger_word.clear();
        self
    }
}

/// What the dispatcher did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Not for the bot: stale, disallowed, or missing the trigger word
    Ignored,
    /// A `/start` or `/help` reply
    Command(String),
    /// An answered question
    Answered(Reply),
}

pub struct MessageDispatcher {
    registry: Arc<OrchestratorRegistry>,
    turn_log: Arc<dyn TurnLog>,
    channel: Arc<dyn Channel>,
    settings: DispatchSettings,
    started_at: DateTime<Utc>,
}

impl MessageDispatcher {
    pub fn new(
        registry: Arc<OrchestratorRegistry>,
        turn_log: Arc<dyn TurnLog>,
        channel: Arc<dyn Channel>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            turn_log,
            channel,
            settings,
            started_at: Utc::now(),
        }
    }

    /// Treat messages stamped before `started_at` as stale.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn registry(&self) -> &Arc<OrchestratorRegistry> {
        &self.registry
    }

    /// Consume messages until the channel closes.
    ///
    /// Each sender gets a worker task that handles their messages one at a
    /// time in arrival order; different senders are answered concurrently.
    /// Returns once the channel has closed and every queued message is handled.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::Receiver<Result<ChannelMessage, ChannelError>>) {
        info!(channel = %self.channel.name(), "Dispatcher started");

        let mut queues: HashMap<String, mpsc::UnboundedSender<ChannelMessage>> = HashMap::new();
        let mut workers = JoinSet::new();

        while let Some(next) = incoming.recv().await {
            match next {
                Ok(msg) => {
                    let queue = queues.entry(msg.sender_id.clone()).or_insert_with(|| {
                        let (tx, rx) = mpsc::unbounded_channel();
                        workers.spawn(self.clone().drain_queue(rx));
                        tx
                    });
                    if let Err(mpsc::error::SendError(msg)) = queue.send(msg) {
                        warn!(sender = %msg.sender_id, "Dispatch worker gone, dropping message");
                    }
                }
                Err(e) => warn!(error = %e, "Channel error"),
            }
        }

        drop(queues);
        info!(
            channel = %self.channel.name(),
            pending_senders = workers.len(),
            "Channel closed, finishing queued messages"
        );
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Dispatch worker failed");
            }
        }

        info!(channel = %self.channel.name(), "Dispatcher stopped");
    }

    async fn drain_queue(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<ChannelMessage>) {
        while let Some(msg) = queue.recv().await {
            self.handle(msg).await;
        }
    }

    /// Handle one message end to end.
    pub async fn handle(&self, msg: ChannelMessage) -> Dispatch {
        if msg.timestamp < self.started_at {
            debug!(message_id = %msg.message_id, "Skipping message sent before startup");
            return Dispatch::Ignored;
        }

        if !self.channel.is_allowed(&msg.sender_id) {
            warn!(sender = %msg.sender_id, "Rejected message from unauthorized sender");
            return Dispatch::Ignored;
        }

        if let Some(reply) = self.command_reply(&msg.content) {
            self.send(&msg, &reply).await;
            return Dispatch::Command(reply);
        }

        let Some(stripped) = self.strip_trigger(&msg.content) else {
            return Dispatch::Ignored;
        };

        let input = match &msg.reply_to_text {
            Some(replied) => replied.clone(),
            None => stripped,
        };

        if input.is_empty() {
            let help = self.settings.help_reply.clone();
            self.send(&msg, &help).await;
            return Dispatch::Command(help);
        }

        if let Err(e) = self.channel.send_typing(&msg.chat_id).await {
            debug!(error = %e, "Typing indicator failed");
        }

        let reply = self.answer(&msg.sender_id, &input).await;
        info!(
            sender = %msg.sender_id,
            kind = ?reply.kind,
            sources = reply.sources.len(),
            "Answered message"
        );

        if reply.kind != ReplyKind::Error {
            let name = msg.sender_name.as_deref().unwrap_or(&msg.sender_id);
            if let Err(e) = self
                .turn_log
                .log_turn(&msg.sender_id, name, &msg.content, &reply.text)
                .await
            {
                warn!(error = %e, log = %self.turn_log.name(), "Failed to log turn");
            }
        }

        self.send(&msg, &reply.text).await;
        Dispatch::Answered(reply)
    }

    async fn answer(&self, user_id: &str, input: &str) -> Reply {
        let answer = self.registry.answer(user_id, input);
        match self.settings.answer_timeout {
            Some(limit) => match tokio::time::timeout(limit, answer).await {
                Ok(reply) => reply,
                Err(_) => {
                    error!(user_id, timeout_secs = limit.as_secs(), "Answer timed out");
                    Reply {
                        text: self.settings.error_reply.clone(),
                        sources: Vec::new(),
                        kind: ReplyKind::Error,
                    }
                }
            },
            None => answer.await,
        }
    }

    async fn send(&self, msg: &ChannelMessage, text: &str) {
        if let Err(e) = self
            .channel
            .send(&msg.chat_id, text, Some(&msg.message_id))
            .await
        {
            error!(chat_id = %msg.chat_id, error = %e, "Failed to send reply");
        }
    }

    /// `/start` and `/help`, with or without a `@botname` suffix.
    fn command_reply(&self, text: &str) -> Option<String> {
        let command = text.split_whitespace().next()?;
        let command = command.split('@').next().unwrap_or(command);
        match command {
            "/start" => Some(self.settings.start_reply.clone()),
            "/help" => Some(self.settings.help_reply.clone()),
            _ => None,
        }
    }

    /// The question text, or `None` when the trigger word is required but
    /// missing. Only the first occurrence of the trigger is removed.
    fn strip_trigger(&self, text: &str) -> Option<String> {
        let trigger = self.settings.trigger_word.as_str();
        if trigger.is_empty() {
            return Some(text.trim().to_string());
        }
        if !text.starts_with(trigger) {
            return None;
        }
        Some(text.replacen(trigger, "", 1).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorSettings;
    use crate::pipeline::GenerationPipeline;
    use crate::test_helpers::*;
    use chrono::Duration as ChronoDuration;
    use ragbot_core::channel::ChannelId;
    use ragbot_memory::InMemoryTurnLog;

    struct Fixture {
        dispatcher: MessageDispatcher,
        channel: Arc<RecordingChannel>,
        turn_log: Arc<InMemoryTurnLog>,
        provider: Arc<ScriptedProvider>,
    }

    fn fixture_with(provider: ScriptedProvider, settings: DispatchSettings) -> Fixture {
        let provider = Arc::new(provider);
        let registry = Arc::new(OrchestratorRegistry::new(
            Arc::new(GenerationPipeline::new(CountingBuilder::with_shared_provider(provider.clone()))),
            OrchestratorSettings::default(),
        ));
        let channel = Arc::new(RecordingChannel::new());
        let turn_log = Arc::new(InMemoryTurnLog::new());
        let dispatcher = MessageDispatcher::new(registry, turn_log.clone(), channel.clone(), settings);
        Fixture {
            dispatcher,
            channel,
            turn_log,
            provider,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedProvider::answering("ISC is a stablecoin."), DispatchSettings::default())
    }

    fn message(text: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: ChannelId("test".into()),
            message_id: "m1".into(),
            sender_id: "1001".into(),
            sender_name: Some("Alice".into()),
            content: text.into(),
            chat_id: "chat-1".into(),
            timestamp: Utc::now() + ChronoDuration::seconds(1),
            reply_to_text: None,
        }
    }

    #[tokio::test]
    async fn answers_triggered_message() {
        let f = fixture();
        let outcome = f.dispatcher.handle(message("/bot what is ISC?")).await;

        let Dispatch::Answered(reply) = outcome else {
            panic!("expected an answer, got {outcome:?}");
        };
        assert_eq!(reply.text, "ISC is a stablecoin.");

        let sent = f.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, "chat-1");
        assert_eq!(sent[0].reply_to.as_deref(), Some("m1"));
        assert_eq!(f.channel.typing_count(), 1);

        let request = f.provider.last_request().unwrap();
        assert!(request.messages.last().unwrap().content.contains("Question: what is ISC?\n"));
    }

    #[tokio::test]
    async fn logs_raw_text_with_sender_name() {
        let f = fixture();
        f.dispatcher.handle(message("/bot what is ISC?")).await;

        let record = f.turn_log.get("1001").await.unwrap().unwrap();
        assert_eq!(record.name, "Alice");
        assert_eq!(record.chat_history[0].input, "/bot what is ISC?");
        assert_eq!(record.chat_history[0].output, "ISC is a stablecoin.");
    }

    #[tokio::test]
    async fn ignores_untriggered_message() {
        let f = fixture();
        assert_eq!(f.dispatcher.handle(message("what is ISC?")).await, Dispatch::Ignored);
        assert!(f.channel.sent().is_empty());
        assert_eq!(f.turn_log.turn_count().await, 0);
    }

    #[tokio::test]
    async fn empty_trigger_answers_everything() {
        let f = fixture_with(
            ScriptedProvider::answering("Sure."),
            DispatchSettings::default().without_trigger(),
        );
        let outcome = f.dispatcher.handle(message("  what is ISC?  ")).await;
        assert!(matches!(outcome, Dispatch::Answered(ref r) if r.text == "Sure."));
    }

    #[tokio::test]
    async fn greeting_after_trigger() {
        let f = fixture();
        let Dispatch::Answered(reply) = f.dispatcher.handle(message("/bot Hi Bot")).await else {
            panic!("expected an answer");
        };
        assert_eq!(reply.kind, ReplyKind::Greeting);
        assert_eq!(f.provider.complete_count(), 0);
    }

    #[tokio::test]
    async fn reply_to_text_becomes_input() {
        let f = fixture();
        let mut msg = message("/bot");
        msg.reply_to_text = Some("How is ISC backed?".into());
        f.dispatcher.handle(msg).await;

        let request = f.provider.last_request().unwrap();
        assert!(request.messages.last().unwrap().content.contains("Question: How is ISC backed?"));

        let record = f.turn_log.get("1001").await.unwrap().unwrap();
        assert_eq!(record.chat_history[0].input, "/bot");
    }

    #[tokio::test]
    async fn bare_trigger_gets_help() {
        let f = fixture();
        let outcome = f.dispatcher.handle(message("/bot   ")).await;
        assert_eq!(outcome, Dispatch::Command(DispatchSettings::default().help_reply));
        assert_eq!(f.provider.complete_count(), 0);
    }

    #[tokio::test]
    async fn start_and_help_commands() {
        let f = fixture();
        let settings = DispatchSettings::default();

        assert_eq!(
            f.dispatcher.handle(message("/start")).await,
            Dispatch::Command(settings.start_reply.clone())
        );
        assert_eq!(
            f.dispatcher.handle(message("/help@ragbot")).await,
            Dispatch::Command(settings.help_reply.clone())
        );
        assert_eq!(f.channel.sent().len(), 2);
        assert_eq!(f.turn_log.turn_count().await, 0);
    }

    #[tokio::test]
    async fn drops_stale_messages() {
        let f = fixture();
        let mut msg = message("/bot what is ISC?");
        msg.timestamp = Utc::now() - ChronoDuration::minutes(5);
        assert_eq!(f.dispatcher.handle(msg).await, Dispatch::Ignored);
        assert!(f.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn drops_disallowed_senders() {
        let f = fixture();
        let channel = Arc::new(RecordingChannel::allowing(&["42"]));
        let dispatcher = MessageDispatcher::new(
            f.dispatcher.registry().clone(),
            f.turn_log.clone(),
            channel.clone(),
            DispatchSettings::default(),
        );

        assert_eq!(dispatcher.handle(message("/bot q")).await, Dispatch::Ignored);
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn failure_replies_without_logging() {
        let f = fixture_with(ScriptedProvider::failing(), DispatchSettings::default());
        let Dispatch::Answered(reply) = f.dispatcher.handle(message("/bot what is ISC?")).await else {
            panic!("expected an answer");
        };
        assert_eq!(reply.kind, ReplyKind::Error);
        assert_eq!(f.channel.sent()[0].content, DispatchSettings::default().error_reply);
        assert_eq!(f.turn_log.turn_count().await, 0);
        assert!(f.turn_log.get("1001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn slow_answer_times_out() {
        let settings = DispatchSettings {
            answer_timeout: Some(Duration::from_millis(20)),
            ..DispatchSettings::default()
        };
        let f = fixture_with(
            ScriptedProvider::answering("late").with_delay(Duration::from_millis(500)),
            settings,
        );

        let Dispatch::Answered(reply) = f.dispatcher.handle(message("/bot q")).await else {
            panic!("expected an answer");
        };
        assert_eq!(reply.kind, ReplyKind::Error);
        assert_eq!(f.turn_log.turn_count().await, 0);
    }

    #[tokio::test]
    async fn send_failure_is_not_fatal() {
        let f = fixture();
        f.channel.fail_sends();
        let outcome = f.dispatcher.handle(message("/bot q")).await;
        assert!(matches!(outcome, Dispatch::Answered(_)));
        assert_eq!(f.turn_log.turn_count().await, 1);
    }

    #[tokio::test]
    async fn run_dispatches_until_channel_closes() {
        let f = fixture();
        let channel = f.channel.clone();
        let dispatcher = Arc::new(f.dispatcher);

        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(message("/bot one"))).await.unwrap();
        tx.send(Err(ChannelError::ConnectionLost("blip".into()))).await.unwrap();
        tx.send(Ok(message("/start"))).await.unwrap();
        drop(tx);

        dispatcher.run(rx).await;
        assert_eq!(channel.sent().len(), 2);
    }

    #[tokio::test]
    async fn run_answers_one_sender_in_arrival_order() {
        let f = fixture_with(
            ScriptedProvider::answering("noted").with_delay(Duration::from_millis(30)),
            DispatchSettings::default(),
        );
        let channel = f.channel.clone();
        let turn_log = f.turn_log.clone();
        let dispatcher = Arc::new(f.dispatcher);

        let questions = ["/bot what is ISC?", "/bot who runs it?", "/bot where is it traded?"];
        let (tx, rx) = mpsc::channel(8);
        for q in questions {
            tx.send(Ok(message(q))).await.unwrap();
        }
        let mut other = message("/bot and the reserves?");
        other.sender_id = "2002".into();
        tx.send(Ok(other)).await.unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        assert_eq!(channel.sent().len(), 4);
        let record = turn_log.get("1001").await.unwrap().unwrap();
        let inputs: Vec<_> = record.chat_history.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, questions);
        assert!(turn_log.get("2002").await.unwrap().is_some());
    }

    #[test]
    fn settings_from_config() {
        let mut config = AppConfig::default();
        config.bot.answer_timeout_secs = 0;
        config.bot.trigger_word = "!ask".into();
        let settings = DispatchSettings::from_config(&config);
        assert!(settings.answer_timeout.is_none());
        assert_eq!(settings.trigger_word, "!ask");
        assert_eq!(DispatchSettings::default().answer_timeout, Some(Duration::from_secs(60)));
    }
}
