//! Vector similarity and an in-process vector index.
//!
//! [`InMemoryIndex`] holds pre-embedded documents and ranks them by cosine
//! similarity. It stands in for a hosted index in tests and offline runs.

use async_trait::async_trait;
use ragbot_core::error::RetrievalError;
use ragbot_core::retriever::{DocumentRef, IndexStats, VectorIndex};
use tokio::sync::RwLock;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

#[derive(Debug, Clone)]
struct IndexedVector {
    id: String,
    values: Vec<f32>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// A [`VectorIndex`] over vectors held in memory.
pub struct InMemoryIndex {
    name: String,
    text_key: String,
    dimension: usize,
    vectors: RwLock<Vec<IndexedVector>>,
}

impl InMemoryIndex {
    /// Create an empty index of the given dimension.
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            text_key: "text".into(),
            dimension,
            vectors: RwLock::new(Vec::new()),
        }
    }

    pub fn with_text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    /// Insert or replace a vector.
    pub async fn upsert(
        &self,
        id: impl Into<String>,
        values: Vec<f32>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), RetrievalError> {
        if values.len() != self.dimension {
            return Err(RetrievalError::QueryFailed(format!(
                "vector dimension {} does not match index dimension {}",
                values.len(),
                self.dimension
            )));
        }

        let id = id.into();
        let mut vectors = self.vectors.write().await;
        vectors.retain(|v| v.id != id);
        vectors.push(IndexedVector { id, values, metadata });
        Ok(())
    }

    /// Convenience: insert a document whose text goes under the text key.
    pub async fn upsert_text(
        &self,
        id: impl Into<String>,
        values: Vec<f32>,
        text: impl Into<String>,
    ) -> Result<(), RetrievalError> {
        let mut metadata = serde_json::Map::new();
        metadata.insert(self.text_key.clone(), serde_json::Value::String(text.into()));
        self.upsert(id, values, metadata).await
    }

    pub async fn len(&self) -> usize {
        self.vectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vectors.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<DocumentRef>, RetrievalError> {
        if vector.len() != self.dimension {
            return Err(RetrievalError::QueryFailed(format!(
                "query dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        let vectors = self.vectors.read().await;
        let mut scored: Vec<(f32, &IndexedVector)> = vectors
            .iter()
            .map(|v| (cosine_similarity(&v.values, &vector), v))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, v)| {
                DocumentRef::from_metadata(v.id.clone(), score, v.metadata.clone(), &self.text_key)
            })
            .collect())
    }

    async fn describe(&self) -> Result<IndexStats, RetrievalError> {
        let count = self.vectors.read().await.len() as u64;
        Ok(IndexStats {
            dimension: self.dimension,
            total_vector_count: count,
            namespace_vector_count: Some(count),
        })
    }
}
