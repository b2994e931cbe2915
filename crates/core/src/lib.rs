//! # RagBot Core
//!
//! Domain types, traits, and error definitions for the RagBot
//! retrieval-augmented chat bot. This crate has **no framework dependencies**:
//! it defines the capabilities the conversation core is written against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`Provider`]: the LLM (chat completion + embeddings)
//! - [`VectorIndex`] / [`Retriever`]: similarity search over a pre-populated index
//! - [`Channel`]: the chat transport
//! - [`TurnLog`]: per-user persistence of answered turns
//!
//! Implementations live in their respective crates, so the orchestration core
//! can be tested entirely against in-process stubs.

pub mod error;
pub mod message;
pub mod provider;
pub mod retriever;
pub mod channel;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use error::{ChannelError, PipelineError, ProviderError, RetrievalError, StoreError};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use retriever::{DocumentRef, IndexStats, Retriever, VectorIndex};
pub use channel::{Channel, ChannelId, ChannelMessage};
pub use transcript::{ChatEntry, TurnLog, UserPreferences, UserRecord};
