//! Error types for the RagBot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; callers convert at the seams.

use thiserror::Error;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Vector index unreachable: {0}")]
    Unreachable(String),

    #[error("Index query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid index response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to encode record: {0}")]
    Encoding(String),
}

/// Failures of the generation pipeline.
///
/// `Initialization` covers a retriever or LLM that cannot be reached while the
/// chain is being built; `Generation` covers a failed or unusable call once it
/// is built. Neither is retried inside the pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Pipeline initialization failed: {0}")]
    Initialization(String),

    #[error("Generation failed: {0}")]
    Generation(String),
}

impl PipelineError {
    pub fn is_initialization(&self) -> bool {
        matches!(self, PipelineError::Initialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn pipeline_error_kinds() {
        let init = PipelineError::Initialization("index down".into());
        let generation = PipelineError::Generation("empty choices".into());
        assert!(init.is_initialization());
        assert!(!generation.is_initialization());
        assert!(init.to_string().contains("index down"));
    }

    #[test]
    fn retrieval_error_displays_cause() {
        let err = RetrievalError::Unreachable("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}
