//! GenerationPipeline: retrieval-augmented generation behind a lazy chain.
//!
//! # Flow
//!
//! 1. The chain (retriever + generator) is built once by a [`ChainBuilder`],
//!    either eagerly through [`GenerationPipeline::initialize`] or lazily on
//!    the first [`GenerationPipeline::call`].
//! 2. Each call retrieves context for the question, renders the QA prompt
//!    and sends it to the generator.
//! 3. The answer text comes back with the documents it was grounded in.
//!
//! Readiness moves `Uninitialized -> Initializing -> Ready`. A failed build
//! falls back to `Uninitialized` and is retried on the next call; `Ready` is
//! final.

use async_trait::async_trait;
use ragbot_config::AppConfig;
use ragbot_core::error::PipelineError;
use ragbot_core::message::Message;
use ragbot_core::provider::{Provider, ProviderRequest};
use ragbot_core::retriever::{DocumentRef, Retriever, VectorIndex};
use ragbot_memory::Turn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::prompt::{render_context, render_history, PromptTemplate};
use crate::retriever::{RetrieverHandle, RetrieverSettings};

/// Generation parameters for the chain.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Send prior turns along with the context
    pub include_history: bool,
    pub template: PromptTemplate,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo-16k".into(),
            temperature: 0.2,
            max_tokens: 300,
            include_history: true,
            template: PromptTemplate::default(),
        }
    }
}

impl GenerationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            include_history: config.llm.include_history,
            template: PromptTemplate::new(&config.prompt.template),
        }
    }
}

/// An answer plus the documents it was grounded in.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedAnswer {
    pub text: String,
    pub sources: Vec<DocumentRef>,
}

/// The composed retriever + generator.
pub struct RetrievalChain {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Provider>,
    settings: GenerationSettings,
}

impl RetrievalChain {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Provider>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            retriever,
            generator,
            settings,
        }
    }

    /// Answer `question` using retrieved context and the prior `history`.
    ///
    /// An empty completion is returned as-is; deciding what to say instead is
    /// the caller's job.
    pub async fn call(&self, question: &str, history: &[Turn]) -> Result<GroundedAnswer, PipelineError> {
        let sources = self
            .retriever
            .fetch(question)
            .await
            .map_err(|e| PipelineError::Generation(format!("retrieval failed: {e}")))?;

        let messages = self.build_messages(question, &sources, history);

        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature: self.settings.temperature,
            max_tokens: Some(self.settings.max_tokens),
            stop: vec![],
        };

        let response = self
            .generator
            .complete(request)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;

        debug!(
            model = %response.model,
            sources = sources.len(),
            answer_len = response.message.content.len(),
            "Generated answer"
        );

        Ok(GroundedAnswer {
            text: response.message.content,
            sources,
        })
    }

    fn build_messages(&self, question: &str, sources: &[DocumentRef], history: &[Turn]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);

        if self.settings.include_history {
            if let Some(block) = render_history(history) {
                messages.push(Message::system(block));
            }
        }

        let context = render_context(sources);
        messages.push(Message::system(self.settings.template.render(&context, question)));
        messages
    }
}

/// Builds the [`RetrievalChain`]. Called at most once per successful build.
#[async_trait]
pub trait ChainBuilder: Send + Sync {
    async fn build(&self) -> Result<RetrievalChain, PipelineError>;
}

/// Builds the chain from a vector index and one provider used for both
/// embeddings and completions.
pub struct ConfiguredChainBuilder {
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn Provider>,
    retriever_settings: RetrieverSettings,
    generation_settings: GenerationSettings,
}

impl ConfiguredChainBuilder {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn Provider>,
        retriever_settings: RetrieverSettings,
        generation_settings: GenerationSettings,
    ) -> Self {
        Self {
            index,
            provider,
            retriever_settings,
            generation_settings,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self::new(
            index,
            provider,
            RetrieverSettings::from_config(config),
            GenerationSettings::from_config(config),
        )
    }
}

#[async_trait]
impl ChainBuilder for ConfiguredChainBuilder {
    async fn build(&self) -> Result<RetrievalChain, PipelineError> {
        let retriever = RetrieverHandle::connect(
            self.index.clone(),
            self.provider.clone(),
            self.retriever_settings.clone(),
        )
        .await?;

        Ok(RetrievalChain::new(
            Arc::new(retriever),
            self.provider.clone(),
            self.generation_settings.clone(),
        ))
    }
}

/// Where the pipeline is in its construction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Initializing,
    Ready,
}

/// The lazily built, shared generation pipeline.
///
/// Holds no conversation state, so one pipeline can serve every user.
pub struct GenerationPipeline {
    builder: Box<dyn ChainBuilder>,
    chain: OnceCell<RetrievalChain>,
    building: AtomicBool,
}

impl GenerationPipeline {
    pub fn new(builder: impl ChainBuilder + 'static) -> Self {
        Self {
            builder: Box::new(builder),
            chain: OnceCell::new(),
            building: AtomicBool::new(false),
        }
    }

    pub fn readiness(&self) -> Readiness {
        if self.chain.initialized() {
            Readiness::Ready
        } else if self.building.load(Ordering::Acquire) {
            Readiness::Initializing
        } else {
            Readiness::Uninitialized
        }
    }

    /// Build the chain unless it already exists.
    ///
    /// Concurrent callers wait for the one build in flight and share its
    /// result. Errors are returned, not retried.
    pub async fn initialize(&self) -> Result<(), PipelineError> {
        self.chain().await.map(|_| ())
    }

    /// Answer `question`, building the chain first if needed.
    pub async fn call(&self, question: &str, history: &[Turn]) -> Result<GroundedAnswer, PipelineError> {
        let chain = self.chain().await?;
        chain.call(question, history).await
    }

    async fn chain(&self) -> Result<&RetrievalChain, PipelineError> {
        self.chain
            .get_or_try_init(|| async {
                let _building = BuildingFlag::raise(&self.building);
                info!("Building retrieval chain");
                let result = self.builder.build().await;

                match &result {
                    Ok(_) => info!("Retrieval chain ready"),
                    Err(e) => warn!(error = %e, "Retrieval chain build failed"),
                }
                result
            })
            .await
    }
}

/// Marks a build in flight; lowered on drop so a cancelled build does not
/// leave the pipeline reporting `Initializing`.
struct BuildingFlag<'a>(&'a AtomicBool);

impl<'a> BuildingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
