//! The conversation core of RagBot.
//!
//! Each incoming question goes through:
//!
//! 1. **Dispatch**: the [`MessageDispatcher`] filters transport messages
//!    (stale, disallowed, untriggered) and picks the sender's conversation
//! 2. **Orchestrate**: the sender's [`ConversationOrchestrator`] records the
//!    turn in its token-budgeted history and short-circuits greetings
//! 3. **Generate**: the shared [`GenerationPipeline`] retrieves context from
//!    the vector index and asks the LLM for a grounded answer
//! 4. **Reply**: empty answers become the fallback reply, failures the error
//!    reply; the turn is logged and the reply sent
//!
//! The pipeline's chain is built once, lazily, and reused by every user.

pub mod dispatch;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod retriever;

#[cfg(test)]
mod test_helpers;

pub use dispatch::{Dispatch, DispatchSettings, MessageDispatcher};
pub use orchestrator::{ConversationOrchestrator, OrchestratorSettings, Reply, ReplyKind};
pub use pipeline::{
    ChainBuilder, ConfiguredChainBuilder, GenerationPipeline, GenerationSettings, GroundedAnswer,
    Readiness, RetrievalChain,
};
pub use prompt::PromptTemplate;
pub use registry::OrchestratorRegistry;
pub use retriever::{RetrieverHandle, RetrieverSettings};
