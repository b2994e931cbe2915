//! Remote capability providers for RagBot.
//!
//! - [`OpenAiCompatProvider`] implements `ragbot_core::Provider` (chat
//!   completions + embeddings) against any OpenAI-compatible endpoint.
//! - [`PineconeIndex`] implements `ragbot_core::VectorIndex` against the
//!   Pinecone data plane.
//!
//! The router builds both from configuration.

pub mod openai_compat;
pub mod pinecone;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use pinecone::PineconeIndex;
pub use router::{build_index, build_provider};
