//! Shared test doubles for the conversation core.

use async_trait::async_trait;
use ragbot_core::channel::{Channel, ChannelId, ChannelMessage};
use ragbot_core::error::{ChannelError, PipelineError, ProviderError, RetrievalError};
use ragbot_core::message::Message;
use ragbot_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};
use ragbot_core::retriever::{DocumentRef, IndexStats, Retriever, VectorIndex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::pipeline::{ChainBuilder, GenerationSettings, RetrievalChain};

/// A provider that always answers with the same text (or always fails).
///
/// Embeddings are the fixed vector `[1.0, 0.0, 0.0]`.
pub struct ScriptedProvider {
    answer: Option<String>,
    delay: Option<Duration>,
    complete_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn answering(text: &str) -> Self {
        Self {
            answer: Some(text.to_string()),
            delay: None,
            complete_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            ..Self::answering("")
        }
    }

    /// Sleep before every completion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn complete_count(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn embed_count(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.answer {
            Some(text) => Ok(make_text_response(text)),
            None => Err(ProviderError::ApiError {
                status_code: 500,
                message: "scripted failure".into(),
            }),
        }
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.answer.is_none() {
            return Err(ProviderError::Network("scripted failure".into()));
        }
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0, 0.0]).collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn document(content: &str, score: f32) -> DocumentRef {
    let mut metadata = serde_json::Map::new();
    metadata.insert("text".into(), serde_json::Value::String(content.into()));
    metadata.insert("source".into(), serde_json::Value::String("whitepaper.pdf".into()));
    DocumentRef::from_metadata(format!("doc-{score}"), score, metadata, "text")
}

/// A retriever that returns fixed documents (or always fails).
pub struct StaticRetriever {
    documents: Option<Vec<DocumentRef>>,
}

impl StaticRetriever {
    pub fn with_documents(documents: Vec<DocumentRef>) -> Self {
        Self {
            documents: Some(documents),
        }
    }

    pub fn failing() -> Self {
        Self { documents: None }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn fetch(&self, _query: &str) -> Result<Vec<DocumentRef>, RetrievalError> {
        self.documents
            .clone()
            .ok_or_else(|| RetrievalError::QueryFailed("static failure".into()))
    }
}

/// An index that cannot be reached.
pub struct UnreachableIndex;

#[async_trait]
impl VectorIndex for UnreachableIndex {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn query(&self, _vector: Vec<f32>, _top_k: usize) -> Result<Vec<DocumentRef>, RetrievalError> {
        Err(RetrievalError::Unreachable("connection refused".into()))
    }

    async fn describe(&self) -> Result<IndexStats, RetrievalError> {
        Err(RetrievalError::Unreachable("connection refused".into()))
    }
}

/// Shared view of how many chains a [`CountingBuilder`] has built.
#[derive(Clone, Default)]
pub struct BuildCounter(Arc<AtomicUsize>);

impl BuildCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A chain builder that counts builds and can fail or stall on demand.
///
/// Chains use a [`StaticRetriever`] with one document.
pub struct CountingBuilder {
    provider: Arc<ScriptedProvider>,
    builds: BuildCounter,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingBuilder {
    pub fn answering(text: &str) -> Self {
        Self::with_provider(ScriptedProvider::answering(text))
    }

    pub fn with_provider(provider: ScriptedProvider) -> Self {
        Self::with_shared_provider(Arc::new(provider))
    }

    pub fn with_shared_provider(provider: Arc<ScriptedProvider>) -> Self {
        Self {
            provider,
            builds: BuildCounter::default(),
            failures_left: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Fail the first `n` builds with an initialization error.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn counter(&self) -> BuildCounter {
        self.builds.clone()
    }
}

#[async_trait]
impl ChainBuilder for CountingBuilder {
    async fn build(&self) -> Result<RetrievalChain, PipelineError> {
        self.builds.0.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PipelineError::Initialization("index unreachable".into()));
        }

        Ok(RetrievalChain::new(
            Arc::new(StaticRetriever::with_documents(vec![document(
                "ISC is pegged to a basket of real-world assets.",
                0.9,
            )])),
            self.provider.clone(),
            GenerationSettings::default(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: String,
    pub content: String,
    pub reply_to: Option<String>,
}

/// A channel that records everything sent through it.
pub struct RecordingChannel {
    id: ChannelId,
    allowed: Vec<String>,
    sent: Mutex<Vec<SentMessage>>,
    typing: AtomicUsize,
    fail_sends: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::allowing(&["*"])
    }

    pub fn allowing(users: &[&str]) -> Self {
        Self {
            id: ChannelId("recording".into()),
            allowed: users.iter().map(|u| u.to_string()).collect(),
            sent: Mutex::new(Vec::new()),
            typing: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn typing_count(&self) -> usize {
        self.typing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, content: &str, reply_to: Option<&str>) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::DeliveryFailed {
                channel: "recording".into(),
                reason: "scripted failure".into(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id: chat_id.into(),
            content: content.into(),
            reply_to: reply_to.map(String::from),
        });
        Ok(())
    }

    async fn send_typing(&self, _chat_id: &str) -> Result<(), ChannelError> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_allowed(&self, sender_id: &str) -> bool {
        self.allowed.iter().any(|u| u == "*" || u == sender_id)
    }
}
