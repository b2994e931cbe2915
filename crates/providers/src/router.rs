//! Provider router: builds the LLM provider and vector index from config.

use std::sync::Arc;
use ragbot_config::{IndexConfig, LlmConfig};
use ragbot_core::provider::Provider;
use ragbot_core::retriever::VectorIndex;
use tracing::debug;
use crate::openai_compat::OpenAiCompatProvider;
use crate::pinecone::PineconeIndex;

/// Build the chat + embedding provider described by `[llm]`.
///
/// Every supported backend speaks the OpenAI wire format; the provider name
/// only selects the default base URL.
pub fn build_provider(config: &LlmConfig) -> Arc<dyn Provider> {
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));
    let api_key = config.api_key.clone().unwrap_or_default();

    debug!(provider = %config.provider, base_url = %base_url, "Building provider");
    Arc::new(OpenAiCompatProvider::new(&config.provider, base_url, api_key))
}

/// Build the Pinecone index described by `[index]`.
pub fn build_index(config: &IndexConfig) -> Arc<dyn VectorIndex> {
    let mut index = PineconeIndex::new(
        &config.name,
        &config.namespace,
        config.api_key.clone().unwrap_or_default(),
    )
    .with_controller_url(&config.controller_url)
    .with_text_key(&config.text_key);

    if let Some(host) = &config.host {
        index = index.with_host(host);
    }

    Arc::new(index)
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
