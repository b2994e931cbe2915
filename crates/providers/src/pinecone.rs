//! Pinecone vector index client.
//!
//! Talks to two endpoints:
//! - the control plane (`GET {controller}/indexes/{name}`), only to discover
//!   the data-plane host when none is configured;
//! - the data plane (`POST {host}/query`, `POST {host}/describe_index_stats`).
//!
//! Ingestion is out of scope: the index is assumed to be populated already,
//! with document text stored in each vector's metadata.

use async_trait::async_trait;
use ragbot_core::error::RetrievalError;
use ragbot_core::retriever::{DocumentRef, IndexStats, VectorIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const API_VERSION: &str = "2024-07";

/// A Pinecone index scoped to one namespace.
pub struct PineconeIndex {
    name: String,
    namespace: String,
    api_key: String,
    text_key: String,
    controller_url: String,
    host: OnceCell<String>,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// Create a client for `name`. The data-plane host is looked up on first use.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            namespace: namespace.into(),
            api_key: api_key.into(),
            text_key: "text".into(),
            controller_url: "https://api.pinecone.io".into(),
            host: OnceCell::new(),
            client,
        }
    }

    /// Skip host discovery and use this data-plane host.
    pub fn with_host(self, host: impl Into<String>) -> Self {
        let host = normalize_host(&host.into());
        Self {
            host: OnceCell::new_with(Some(host)),
            ..self
        }
    }

    /// Override the control-plane URL.
    pub fn with_controller_url(mut self, url: impl Into<String>) -> Self {
        self.controller_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Metadata key that holds the document text (default `"text"`).
    pub fn with_text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The data-plane host, discovering it through the control plane once.
    async fn host(&self) -> Result<&str, RetrievalError> {
        self.host
            .get_or_try_init(|| async {
                let url = format!("{}/indexes/{}", self.controller_url, self.name);
                debug!(index = %self.name, "Resolving Pinecone index host");

                let response = self
                    .client
                    .get(&url)
                    .header("Api-Key", &self.api_key)
                    .header("X-Pinecone-API-Version", API_VERSION)
                    .send()
                    .await
                    .map_err(|e| RetrievalError::Unreachable(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(RetrievalError::Unreachable(format!(
                        "describe index '{}' returned {}: {}",
                        self.name, status, body
                    )));
                }

                let description: IndexDescription = response
                    .json()
                    .await
                    .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;

                info!(index = %self.name, host = %description.host, "Resolved Pinecone index host");
                Ok::<_, RetrievalError>(normalize_host(&description.host))
            })
            .await
            .map(String::as_str)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, RetrievalError> {
        let host = self.host().await?;
        let url = format!("{host}{path}");

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| RetrievalError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(index = %self.name, %status, body = %body, "Pinecone request failed");
            return Err(RetrievalError::QueryFailed(format!("{path} returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))
    }

    fn to_documents(&self, response: QueryResponse) -> Vec<DocumentRef> {
        response
            .matches
            .into_iter()
            .map(|m| DocumentRef::from_metadata(m.id, m.score, m.metadata, &self.text_key))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: Vec<f32>, top_k: usize) -> Result<Vec<DocumentRef>, RetrievalError> {
        let request = QueryRequest {
            vector,
            top_k,
            namespace: &self.namespace,
            include_metadata: true,
            include_values: false,
        };
        let response: QueryResponse = self.post("/query", &request).await?;
        debug!(index = %self.name, matches = response.matches.len(), "Pinecone query complete");
        Ok(self.to_documents(response))
    }

    async fn describe(&self) -> Result<IndexStats, RetrievalError> {
        let stats: StatsResponse = self
            .post("/describe_index_stats", &serde_json::json!({}))
            .await
            .map_err(|e| match e {
                RetrievalError::QueryFailed(msg) => RetrievalError::Unreachable(msg),
                other => other,
            })?;
        Ok(stats.into_index_stats(&self.namespace))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

// --- Pinecone API types (internal) ---

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceStats>,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceStats {
    #[serde(default)]
    vector_count: u64,
}

impl StatsResponse {
    fn into_index_stats(self, namespace: &str) -> IndexStats {
        IndexStats {
            dimension: self.dimension,
            total_vector_count: self.total_vector_count,
            namespace_vector_count: self.namespaces.get(namespace).map(|n| n.vector_count),
        }
    }
}
