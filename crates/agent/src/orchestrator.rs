//! ConversationOrchestrator: the conversation core for one user.
//!
//! Owns a [`TokenBudgetedHistory`] and shares a [`GenerationPipeline`]. For
//! every input it:
//!
//! 1. appends the input to history and evicts over budget;
//! 2. answers greetings with a canned reply, without touching the pipeline;
//! 3. otherwise asks the pipeline, appending a non-empty answer to history;
//! 4. substitutes the fallback reply for an empty answer and the error reply
//!    for any failure.
//!
//! [`ConversationOrchestrator::answer`] never fails.

use ragbot_config::AppConfig;
use ragbot_core::error::PipelineError;
use ragbot_core::retriever::DocumentRef;
use ragbot_memory::{history_threshold, TokenBudgetedHistory, Turn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::pipeline::{GenerationPipeline, Readiness};

/// Canned replies and budgets, built from config.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Inputs answered with `greeting_reply`, compared trimmed and lowercased
    pub greetings: Vec<String>,
    pub greeting_reply: String,
    pub fallback_reply: String,
    pub error_reply: String,
    /// History is trimmed while its cost is at or above this
    pub history_threshold: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            greetings: config.bot.greetings.clone(),
            greeting_reply: config.bot.greeting_reply.clone(),
            fallback_reply: config.bot.fallback_reply.clone(),
            error_reply: config.bot.error_reply.clone(),
            history_threshold: history_threshold(config.llm.max_tokens),
        }
    }
}

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Greeting,
    Generated,
    Fallback,
    Error,
}

/// A reply with the documents behind it (empty unless `Generated`).
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub sources: Vec<DocumentRef>,
    pub kind: ReplyKind,
}

impl Reply {
    fn canned(text: &str, kind: ReplyKind) -> Self {
        Self {
            text: text.to_string(),
            sources: Vec::new(),
            kind,
        }
    }
}

pub struct ConversationOrchestrator {
    pipeline: Arc<GenerationPipeline>,
    settings: OrchestratorSettings,
    greetings: Vec<String>,
    history: Mutex<TokenBudgetedHistory>,
}

impl ConversationOrchestrator {
    pub fn new(pipeline: Arc<GenerationPipeline>, settings: OrchestratorSettings) -> Self {
        let greetings = settings
            .greetings
            .iter()
            .map(|g| normalize(g))
            .collect();
        Self {
            pipeline,
            settings,
            greetings,
            history: Mutex::new(TokenBudgetedHistory::new()),
        }
    }

    /// Build the pipeline now rather than on the first question.
    ///
    /// On failure the orchestrator stays usable; the next question retries.
    pub async fn initialize(&self) -> Result<(), PipelineError> {
        self.pipeline.initialize().await.inspect_err(|e| {
            warn!(error = %e, "Pipeline initialization failed; will retry on first question");
        })
    }

    /// Answer `input`. Always returns non-empty text.
    pub async fn answer(&self, input: &str) -> String {
        self.answer_with_sources(input).await.text
    }

    /// Answer `input`, keeping the grounding documents and the reply kind.
    pub async fn answer_with_sources(&self, input: &str) -> Reply {
        let mut history = self.history.lock().await;
        let threshold = self.settings.history_threshold;

        history.append(Turn::new(input));
        history.evict_if_over_budget(threshold);

        if self.is_greeting(input) {
            debug!("Greeting short-circuit");
            return Reply::canned(&self.settings.greeting_reply, ReplyKind::Greeting);
        }

        let prior = prior_turns(&history);

        match self.pipeline.call(input, &prior).await {
            Ok(answer) if answer.text.trim().is_empty() => {
                info!(sources = answer.sources.len(), "Empty answer, using fallback");
                Reply::canned(&self.settings.fallback_reply, ReplyKind::Fallback)
            }
            Ok(answer) => {
                history.append(Turn::new(answer.text.clone()));
                history.evict_if_over_budget(threshold);
                debug!(
                    turns = history.len(),
                    total_cost = history.total_cost(),
                    "Answer appended to history"
                );
                Reply {
                    text: answer.text,
                    sources: answer.sources,
                    kind: ReplyKind::Generated,
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to answer");
                Reply::canned(&self.settings.error_reply, ReplyKind::Error)
            }
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.pipeline.readiness()
    }

    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn history_total_cost(&self) -> usize {
        self.history.lock().await.total_cost()
    }

    fn is_greeting(&self, input: &str) -> bool {
        let normalized = normalize(input);
        self.greetings.iter().any(|g| *g == normalized)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Every turn except the newest, which is the input being answered.
fn prior_turns(history: &TokenBudgetedHistory) -> Vec<Turn> {
    let mut turns = history.snapshot();
    turns.pop();
    turns
}
