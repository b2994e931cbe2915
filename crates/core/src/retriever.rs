//! Retrieval traits: similarity search over a pre-populated vector index.
//!
//! Two layers:
//! - [`VectorIndex`] is the raw store: "given a vector, return the nearest
//!   documents". Implementations: Pinecone, in-memory.
//! - [`Retriever`] is the capability the generation pipeline needs:
//!   "given a query string, return relevant context". It owns the embedding
//!   step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// A document returned by the index.
///
/// `metadata` is passed through exactly as the index returned it; the
/// pipeline never rewrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Vector ID in the index
    pub id: String,

    /// Document text (read from the configured metadata key)
    pub content: String,

    /// Similarity score reported by the index
    #[serde(default)]
    pub score: f32,

    /// Raw metadata attached to the vector
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DocumentRef {
    /// Build a document from raw metadata, reading its text from `text_key`.
    ///
    /// A missing or non-string text field yields empty content; the metadata
    /// is kept as-is either way.
    pub fn from_metadata(
        id: impl Into<String>,
        score: f32,
        metadata: serde_json::Map<String, serde_json::Value>,
        text_key: &str,
    ) -> Self {
        let content = metadata
            .get(text_key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Self {
            id: id.into(),
            content,
            score,
            metadata,
        }
    }

    /// The `source` metadata field, if the ingestion pipeline recorded one.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Summary statistics for an index (used as a reachability probe).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Vector dimension
    pub dimension: usize,

    /// Total vectors across all namespaces
    pub total_vector_count: u64,

    /// Vector count in the namespace this handle queries, if it exists
    pub namespace_vector_count: Option<u64>,
}

/// A similarity-search capability over an embedding index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Index name, for logs.
    fn name(&self) -> &str;

    /// Return up to `top_k` documents nearest to `vector`, best first.
    async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
    ) -> std::result::Result<Vec<DocumentRef>, RetrievalError>;

    /// Describe the index. Fails with [`RetrievalError::Unreachable`] when the
    /// index cannot be reached.
    async fn describe(&self) -> std::result::Result<IndexStats, RetrievalError>;
}

/// "Given a query, return relevant context."
///
/// Results are never cached; every call hits the index.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn fetch(&self, query: &str) -> std::result::Result<Vec<DocumentRef>, RetrievalError>;
}
