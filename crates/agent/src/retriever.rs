//! RetrieverHandle: "given a query, return relevant context".
//!
//! Wraps a [`VectorIndex`] and an embedding-capable [`Provider`]. Every fetch
//! embeds the query and hits the index; nothing is cached.

use async_trait::async_trait;
use ragbot_config::AppConfig;
use ragbot_core::error::{PipelineError, RetrievalError};
use ragbot_core::provider::{EmbeddingRequest, Provider};
use ragbot_core::retriever::{DocumentRef, Retriever, VectorIndex};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Retrieval parameters.
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub embedding_model: String,
    pub top_k: usize,
    /// Drop documents scoring below this
    pub min_score: Option<f32>,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-ada-002".into(),
            top_k: 4,
            min_score: None,
        }
    }
}

impl RetrieverSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            embedding_model: config.llm.embedding_model.clone(),
            top_k: config.index.top_k,
            min_score: config.index.min_score,
        }
    }
}

/// A connected retriever over a pre-populated index.
pub struct RetrieverHandle {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Provider>,
    settings: RetrieverSettings,
}

impl std::fmt::Debug for RetrieverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrieverHandle")
            .field("index", &self.index.name())
            .field("embedder", &self.embedder.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl RetrieverHandle {
    /// Connect to `index`, proving it is reachable.
    ///
    /// An unreachable index is an initialization error. A namespace the index
    /// does not report is only warned about: it queries as empty.
    pub async fn connect(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Provider>,
        settings: RetrieverSettings,
    ) -> Result<Self, PipelineError> {
        let stats = index.describe().await.map_err(|e| {
            PipelineError::Initialization(format!("vector index '{}' unreachable: {e}", index.name()))
        })?;

        match stats.namespace_vector_count {
            Some(count) => info!(
                index = %index.name(),
                dimension = stats.dimension,
                vectors = count,
                "Connected to vector index"
            ),
            None => warn!(
                index = %index.name(),
                total_vectors = stats.total_vector_count,
                "Namespace not found in index; queries will return nothing"
            ),
        }

        Ok(Self {
            index,
            embedder,
            settings,
        })
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }
}

#[async_trait]
impl Retriever for RetrieverHandle {
    async fn fetch(&self, query: &str) -> Result<Vec<DocumentRef>, RetrievalError> {
        let response = self
            .embedder
            .embed(EmbeddingRequest {
                model: self.settings.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        let vector = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("provider returned no embedding".into()))?;

        let mut documents = self.index.query(vector, self.settings.top_k).await?;

        if let Some(min_score) = self.settings.min_score {
            documents.retain(|d| d.score >= min_score);
        }
        documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        debug!(index = %self.index.name(), documents = documents.len(), "Retrieved context");
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use ragbot_memory::InMemoryIndex;

    async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = InMemoryIndex::new("docs", 3);
        index.upsert_text("a", vec![1.0, 0.0, 0.0], "ISC is pegged to a basket.").await.unwrap();
        index.upsert_text("b", vec![0.6, 0.8, 0.0], "It resists inflation.").await.unwrap();
        index.upsert_text("c", vec![0.0, 0.0, 1.0], "Unrelated.").await.unwrap();
        Arc::new(index)
    }

    #[tokio::test]
    async fn connect_fails_when_unreachable() {
        let err = RetrieverHandle::connect(
            Arc::new(UnreachableIndex),
            Arc::new(ScriptedProvider::answering("x")),
            RetrieverSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_initialization());
        assert!(err.to_string().contains("unreachable"));
    }

    #[tokio::test]
    async fn fetch_returns_ranked_documents() {
        let provider = Arc::new(ScriptedProvider::answering("x"));
        let handle = RetrieverHandle::connect(
            seeded_index().await,
            provider.clone(),
            RetrieverSettings {
                top_k: 2,
                ..RetrieverSettings::default()
            },
        )
        .await
        .unwrap();

        let docs = handle.fetch("what is ISC?").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[1].id, "b");
        assert_eq!(provider.embed_count(), 1);
    }

    #[tokio::test]
    async fn fetch_is_not_cached() {
        let provider = Arc::new(ScriptedProvider::answering("x"));
        let handle = RetrieverHandle::connect(seeded_index().await, provider.clone(), RetrieverSettings::default())
            .await
            .unwrap();

        handle.fetch("same").await.unwrap();
        handle.fetch("same").await.unwrap();
        assert_eq!(provider.embed_count(), 2);
    }

    #[tokio::test]
    async fn min_score_filters() {
        let handle = RetrieverHandle::connect(
            seeded_index().await,
            Arc::new(ScriptedProvider::answering("x")),
            RetrieverSettings {
                min_score: Some(0.7),
                ..RetrieverSettings::default()
            },
        )
        .await
        .unwrap();

        let docs = handle.fetch("q").await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn embedding_failure_surfaces() {
        let handle = RetrieverHandle::connect(
            seeded_index().await,
            Arc::new(ScriptedProvider::failing()),
            RetrieverSettings::default(),
        )
        .await
        .unwrap();

        let err = handle.fetch("q").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmbeddingFailed(_)));
    }

    #[test]
    fn settings_from_config() {
        let mut config = AppConfig::default();
        config.index.top_k = 7;
        config.index.min_score = Some(0.3);
        let settings = RetrieverSettings::from_config(&config);
        assert_eq!(settings.top_k, 7);
        assert_eq!(settings.min_score, Some(0.3));
        assert_eq!(settings.embedding_model, "text-embedding-ada-002");
    }
}
