//! Configuration loading, validation, and management for RagBot.
//!
//! Loads configuration from `~/.ragbot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragbot/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Vector index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Prompt template
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Conversation behavior (trigger word, greetings, canned replies)
    #[serde(default)]
    pub bot: BotConfig,

    /// Telegram transport
    #[serde(default)]
    pub telegram: TelegramSettings,

    /// Turn log storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// --- [llm] ---

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name, used for logs and default base URL lookup
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per LLM response. Also sizes the history budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Whether prior turns are sent along with the retrieved context
    #[serde(default = "default_true")]
    pub include_history: bool,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo-16k".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    300
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_true() -> bool {
    true
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            embedding_model: default_embedding_model(),
            include_history: true,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .field("include_history", &self.include_history)
            .finish()
    }
}

// --- [index] ---

#[derive(Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index name
    #[serde(default)]
    pub name: String,

    /// Namespace inside the index (empty = default namespace)
    #[serde(default)]
    pub namespace: String,

    /// Data-plane host. Resolved through the control plane when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// Metadata key that holds the document text
    #[serde(default = "default_text_key")]
    pub text_key: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

fn default_controller_url() -> String {
    "https://api.pinecone.io".into()
}
fn default_text_key() -> String {
    "text".into()
}
fn default_top_k() -> usize {
    4
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: String::new(),
            host: None,
            api_key: None,
            controller_url: default_controller_url(),
            text_key: default_text_key(),
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("host", &self.host)
            .field("api_key", &redact(&self.api_key))
            .field("controller_url", &self.controller_url)
            .field("text_key", &self.text_key)
            .field("top_k", &self.top_k)
            .field("min_score", &self.min_score)
            .finish()
    }
}

// --- [prompt] ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Must contain `{context}` and `{question}`.
    #[serde(default = "default_template")]
    pub template: String,
}

/// Default QA template: a short-answer instruction and a fallback instruction
/// live in the template text itself.
pub const DEFAULT_TEMPLATE: &str = "You are a helpful assistant that answers questions \
about the documents in your knowledge base. Keep your answers to 50-60 words only. \
If you are not able to answer a question from the provided context, reply only with: \
I don't know that yet, please check the project website for more information.\
\n\nProvided Context: {context}\n\nQuestion: {question}\nAi: ";

fn default_template() -> String {
    DEFAULT_TEMPLATE.into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: default_template(),
        }
    }
}

// --- [bot] ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix a message must start with to be answered. Empty = answer everything.
    #[serde(default = "default_trigger_word")]
    pub trigger_word: String,

    /// Inputs answered with `greeting_reply` (compared trimmed, case-insensitive)
    #[serde(default = "default_greetings")]
    pub greetings: Vec<String>,

    #[serde(default = "default_greeting_reply")]
    pub greeting_reply: String,

    /// Returned when the model produces an empty answer
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Returned when generation fails
    #[serde(default = "default_error_reply")]
    pub error_reply: String,

    /// Reply to `/start`
    #[serde(default = "default_start_reply")]
    pub start_reply: String,

    /// Reply to `/help`
    #[serde(default = "default_help_reply")]
    pub help_reply: String,

    /// Upper bound on one answer, in seconds. 0 disables the bound.
    #[serde(default = "default_answer_timeout")]
    pub answer_timeout_secs: u64,
}

fn default_trigger_word() -> String {
    "/bot".into()
}
fn default_greetings() -> Vec<String> {
    vec![
        "hi".into(),
        "hello".into(),
        "hi bot".into(),
        "hello bot".into(),
        "hey".into(),
    ]
}
fn default_greeting_reply() -> String {
    "Hi, I'm RagBot, feel free to talk to me. How can I be of assistance today?".into()
}
fn default_fallback_reply() -> String {
    "Sorry, I couldn't generate a response. Please try rephrasing your question.".into()
}
fn default_error_reply() -> String {
    "I encountered an error processing your request.".into()
}
fn default_start_reply() -> String {
    "Hi, I'm RagBot, your guide to this knowledge base. How can I help?".into()
}
fn default_help_reply() -> String {
    "Send me a message starting with /bot and I will assist you.".into()
}
fn default_answer_timeout() -> u64 {
    60
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            trigger_word: default_trigger_word(),
            greetings: default_greetings(),
            greeting_reply: default_greeting_reply(),
            fallback_reply: default_fallback_reply(),
            error_reply: default_error_reply(),
            start_reply: default_start_reply(),
            help_reply: default_help_reply(),
            answer_timeout_secs: default_answer_timeout(),
        }
    }
}

// --- [telegram] ---

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// Bot token from @BotFather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Allowlist of sender IDs. Empty = deny all. ["*"] = allow all.
    #[serde(default = "default_allowed_users")]
    pub allowed_users: Vec<String>,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

fn default_allowed_users() -> Vec<String> {
    vec!["*".into()]
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_telegram_api_url() -> String {
    "https://api.telegram.org".into()
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: default_allowed_users(),
            poll_timeout_secs: default_poll_timeout(),
            api_url: default_telegram_api_url(),
        }
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &redact(&self.bot_token))
            .field("allowed_users", &self.allowed_users)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("api_url", &self.api_url)
            .finish()
    }
}

// --- [storage] ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding per-user conversation records
    #[serde(default = "default_users_path")]
    pub users_path: PathBuf,
}

fn default_users_path() -> PathBuf {
    AppConfig::config_dir().join("users.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_path: default_users_path(),
        }
    }
}

/// What a command needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// LLM + index (terminal chat)
    Generation,
    /// LLM + index + Telegram token
    Serving,
}

impl AppConfig {
    /// Load configuration from the default path (~/.ragbot/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Secrets from the environment only fill values the file left empty;
    /// model and index selection always override.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("RAGBOT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(model) = lookup("RAGBOT_MODEL").or_else(|| lookup("OPENAI_MODEL")) {
            self.llm.model = model;
        }
        if self.index.api_key.is_none() {
            self.index.api_key = lookup("PINECONE_API_KEY");
        }
        if let Some(name) = lookup("PINECONE_INDEX_NAME") {
            self.index.name = name;
        }
        if let Some(namespace) = lookup("PINECONE_NAMESPACE") {
            self.index.namespace = namespace;
        }
        if let Some(host) = lookup("PINECONE_HOST") {
            self.index.host = Some(host);
        }
        if self.telegram.bot_token.is_none() {
            self.telegram.bot_token = lookup("TELEGRAM_TOKEN");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragbot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be > 0".into(),
            ));
        }

        for placeholder in ["{context}", "{question}"] {
            if !self.prompt.template.contains(placeholder) {
                return Err(ConfigError::ValidationError(format!(
                    "prompt.template must contain {placeholder}"
                )));
            }
        }

        if self.index.top_k == 0 {
            return Err(ConfigError::ValidationError("index.top_k must be > 0".into()));
        }

        if self.bot.trigger_word.trim() != self.bot.trigger_word {
            return Err(ConfigError::ValidationError(
                "bot.trigger_word must not have surrounding whitespace".into(),
            ));
        }

        Ok(())
    }

    /// Check that every value a command needs is present.
    pub fn require(&self, requirement: Requirement) -> Result<(), ConfigError> {
        if self.llm.api_key.is_none() {
            return Err(ConfigError::Missing("llm.api_key (or OPENAI_API_KEY)"));
        }
        if self.index.name.is_empty() && self.index.host.is_none() {
            return Err(ConfigError::Missing("index.name (or PINECONE_INDEX_NAME)"));
        }
        if self.index.api_key.is_none() {
            return Err(ConfigError::Missing("index.api_key (or PINECONE_API_KEY)"));
        }
        if requirement == Requirement::Serving && self.telegram.bot_token.is_none() {
            return Err(ConfigError::Missing("telegram.bot_token (or TELEGRAM_TOKEN)"));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}
