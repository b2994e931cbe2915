//! Turn log: per-user persistence of answered conversation turns.
//!
//! The conversation core never persists anything itself. After each answer
//! the dispatcher hands the turn to a [`TurnLog`], keyed by the sender's
//! identity. Records serialize to the same camelCase shape the bot has always
//! written to `users.json`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::error::StoreError;

/// One answered exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-user preferences.
///
/// Known keys are typed; anything else a previous version wrote is kept in
/// `extra` so a load/save cycle never drops data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    /// Preferred reply language (BCP-47 tag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Stored greeting preference; carried through load/save, not read by the bot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_greetings: Option<bool>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Everything stored about one end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Platform user ID
    #[serde(rename = "telegramId", alias = "userId")]
    pub user_id: String,

    /// Display name at the time the record was created
    pub name: String,

    #[serde(default)]
    pub chat_history: Vec<ChatEntry>,

    #[serde(default)]
    pub preferences: UserPreferences,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            chat_history: Vec::new(),
            preferences: UserPreferences::default(),
        }
    }

    /// Append an exchange stamped with the current time.
    pub fn push_turn(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.chat_history.push(ChatEntry {
            input: input.into(),
            output: output.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Persistence collaborator for answered turns.
///
/// Implementations: JSON file, in-memory (for testing).
#[async_trait]
pub trait TurnLog: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Append one turn to the user's history, creating the user if needed.
    async fn log_turn(
        &self,
        user_id: &str,
        name: &str,
        input: &str,
        output: &str,
    ) -> std::result::Result<(), StoreError>;

    /// Fetch a user's record.
    async fn get(&self, user_id: &str) -> std::result::Result<Option<UserRecord>, StoreError>;
}
