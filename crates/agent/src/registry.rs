//! OrchestratorRegistry: one conversation per end user.
//!
//! Every user gets their own [`ConversationOrchestrator`] (and so their own
//! history), created on first contact. All of them share one
//! [`GenerationPipeline`].

use std::collections::HashMap;
use std::sync::Arc;
use ragbot_core::error::PipelineError;
use tokio::sync::RwLock;
use tracing::debug;

use crate::orchestrator::{ConversationOrchestrator, OrchestratorSettings, Reply};
use crate::pipeline::GenerationPipeline;

pub struct OrchestratorRegistry {
    pipeline: Arc<GenerationPipeline>,
    settings: OrchestratorSettings,
    orchestrators: RwLock<HashMap<String, Arc<ConversationOrchestrator>>>,
}

impl OrchestratorRegistry {
    pub fn new(pipeline: Arc<GenerationPipeline>, settings: OrchestratorSettings) -> Self {
        Self {
            pipeline,
            settings,
            orchestrators: RwLock::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &Arc<GenerationPipeline> {
        &self.pipeline
    }

    /// Build the shared pipeline ahead of the first question.
    pub async fn initialize(&self) -> Result<(), PipelineError> {
        self.pipeline.initialize().await
    }

    /// The orchestrator for `user_id`, created if this is a new user.
    pub async fn get_or_create(&self, user_id: &str) -> Arc<ConversationOrchestrator> {
        if let Some(existing) = self.orchestrators.read().await.get(user_id) {
            return existing.clone();
        }

        let mut orchestrators = self.orchestrators.write().await;
        orchestrators
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id, "Creating conversation");
                Arc::new(ConversationOrchestrator::new(
                    self.pipeline.clone(),
                    self.settings.clone(),
                ))
            })
            .clone()
    }

    /// Answer `input` in `user_id`'s conversation.
    pub async fn answer(&self, user_id: &str, input: &str) -> Reply {
        self.get_or_create(user_id).await.answer_with_sources(input).await
    }

    /// Number of known users.
    pub async fn len(&self) -> usize {
        self.orchestrators.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orchestrators.read().await.is_empty()
    }
}
