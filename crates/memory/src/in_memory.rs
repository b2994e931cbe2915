//! In-memory turn log: useful for testing and the terminal chat.

use async_trait::async_trait;
use ragbot_core::error::StoreError;
use ragbot_core::transcript::{TurnLog, UserRecord};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A [`TurnLog`] that keeps records in a Vec. Nothing survives the process.
pub struct InMemoryTurnLog {
    records: Arc<RwLock<Vec<UserRecord>>>,
}

impl InMemoryTurnLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Total number of logged turns across all users.
    pub async fn turn_count(&self) -> usize {
        self.records
            .read()
            .await
            .iter()
            .map(|r| r.chat_history.len())
            .sum()
    }
}

impl Default for InMemoryTurnLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TurnLog for InMemoryTurnLog {
    fn name(&self) -> &str { "in_memory" }

    async fn log_turn(
        &self,
        user_id: &str,
        name: &str,
        input: &str,
        output: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.user_id == user_id) {
            Some(record) => record.push_turn(input, output),
            None => {
                let mut record = UserRecord::new(user_id, name);
                record.push_turn(input, output);
                records.push(record);
            }
        }
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.user_id == user_id).cloned())
    }
}
