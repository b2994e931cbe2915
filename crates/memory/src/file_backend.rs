//! File-based turn log: per-user records in one JSON file.
//!
//! The file holds a pretty-printed JSON array of [`UserRecord`]s, the same
//! shape the bot has always written to `users.json`:
//!
//! ```json
//! [
//!   {
//!     "telegramId": "1001",
//!     "name": "Alice",
//!     "chatHistory": [{ "input": "/bot hi", "output": "Hello!", "timestamp": "..." }],
//!     "preferences": {}
//!   }
//! ]
//! ```
//!
//! Every logged turn re-reads the file, updates one record and rewrites it,
//! so edits made by other tools between turns are preserved. The rewrite goes
//! to a sibling temp file that is renamed over `users.json`, and a file that
//! does not parse is never overwritten.

use async_trait::async_trait;
use ragbot_core::error::StoreError;
use ragbot_core::transcript::{TurnLog, UserRecord};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A [`TurnLog`] backed by a JSON file.
///
/// Writes are serialized through a mutex. Reads of a missing file yield an
/// empty record set and reads of a corrupt file are treated as empty (with a
/// warning), but logging a turn into a corrupt file fails.
pub struct FileTurnLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTurnLog {
    /// Create a log at `path`. The file is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all records. A corrupt file reads as empty.
    pub async fn load(&self) -> Result<Vec<UserRecord>, StoreError> {
        let Some(content) = self.read().await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<UserRecord>>(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupted user records file, reading as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Load all records for a rewrite. A corrupt file is an error.
    async fn load_for_update(&self) -> Result<Vec<UserRecord>, StoreError> {
        let Some(content) = self.read().await? else {
            return Ok(Vec::new());
        };

        serde_json::from_str(&content).map_err(|e| {
            StoreError::Storage(format!(
                "{} is not a valid user records file, refusing to overwrite it: {e}",
                self.path.display()
            ))
        })
    }

    /// File content, or `None` when the file is missing or blank.
    async fn read(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(c) if c.trim().is_empty() => Ok(None),
            Ok(c) => Ok(Some(c)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Storage(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    async fn save(&self, records: &[UserRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Storage(format!("Failed to create storage directory: {e}"))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content).await.map_err(|e| {
            StoreError::Storage(format!("Failed to write {}: {e}", tmp.display()))
        })?;

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Storage(format!(
                "Failed to replace {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TurnLog for FileTurnLog {
    fn name(&self) -> &str {
        "file"
    }

    async fn log_turn(
        &self,
        user_id: &str,
        name: &str,
        input: &str,
        output: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_for_update().await?;

        match records.iter_mut().find(|r| r.user_id == user_id) {
            Some(record) => record.push_turn(input, output),
            None => {
                debug!(user_id, "Creating user record");
                let mut record = UserRecord::new(user_id, name);
                record.push_turn(input, output);
                records.push(record);
            }
        }

        self.save(&records).await
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let records = self.load().await?;
        Ok(records.into_iter().find(|r| r.user_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn temp_log() -> (TempDir, FileTurnLog) {
        let dir = TempDir::new().unwrap();
        let log = FileTurnLog::new(dir.path().join("users.json"));
        (dir, log)
    }

    #[tokio::test]
    async fn creates_record_on_first_turn() {
        let (_dir, log) = temp_log();
        log.log_turn("1001", "Alice", "/bot what is ISC?", "A stablecoin.")
            .await
            .unwrap();

        let record = log.get("1001").await.unwrap().unwrap();
        assert_eq!(record.name, "Alice");
        assert_eq!(record.chat_history.len(), 1);
        assert_eq!(record.chat_history[0].output, "A stablecoin.");

        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.contains("\"telegramId\": \"1001\""));
        assert!(raw.contains("\"chatHistory\""));
    }

    #[tokio::test]
    async fn appends_to_existing_user() {
        let (_dir, log) = temp_log();
        log.log_turn("1001", "Alice", "q1", "a1").await.unwrap();
        log.log_turn("2002", "Bob", "q", "a").await.unwrap();
        log.log_turn("1001", "Alice B.", "q2", "a2").await.unwrap();

        let records = log.load().await.unwrap();
        assert_eq!(records.len(), 2);
        let alice = log.get("1001").await.unwrap().unwrap();
        assert_eq!(alice.name, "Alice");
        let inputs: Vec<_> = alice.chat_history.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, vec!["q1", "q2"]);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let (_dir, log) = temp_log();
        assert!(log.load().await.unwrap().is_empty());
        assert!(log.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let (_dir, log) = temp_log();
        std::fs::write(log.path(), "{ not json").unwrap();
        assert!(log.load().await.unwrap().is_empty());
        assert!(log.get("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_file_is_never_overwritten() {
        let (_dir, log) = temp_log();
        log.log_turn("1", "Alice", "q1", "a1").await.unwrap();
        log.log_turn("2", "Bob", "q2", "a2").await.unwrap();

        let full = std::fs::read_to_string(log.path()).unwrap();
        let truncated = &full[..full.len() / 2];
        std::fs::write(log.path(), truncated).unwrap();

        let err = log.log_turn("3", "Carol", "q3", "a3").await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), truncated);
    }

    #[tokio::test]
    async fn rewrite_leaves_no_temp_file() {
        let (dir, log) = temp_log();
        log.log_turn("1", "Alice", "q1", "a1").await.unwrap();
        log.log_turn("1", "Alice", "q2", "a2").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["users.json"]);
        assert_eq!(log.get("1").await.unwrap().unwrap().chat_history.len(), 2);
    }

    #[tokio::test]
    async fn keeps_unknown_preferences() {
        let (_dir, log) = temp_log();
        std::fs::write(
            log.path(),
            r#"[{"telegramId":"7","name":"Bob","chatHistory":[],"preferences":{"theme":"dark"}}]"#,
        )
        .unwrap();

        log.log_turn("7", "Bob", "hi", "hello").await.unwrap();
        let record = log.get("7").await.unwrap().unwrap();
        assert_eq!(record.preferences.extra["theme"], "dark");
        assert_eq!(record.chat_history.len(), 1);
    }

    #[tokio::test]
    async fn creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let log = FileTurnLog::new(dir.path().join("nested").join("users.json"));
        log.log_turn("1", "A", "i", "o").await.unwrap();
        assert!(log.path().exists());
    }

    #[tokio::test]
    async fn concurrent_writes_are_not_lost() {
        let (_dir, log) = temp_log();
        let log = Arc::new(log);

        let mut handles = Vec::new();
        for i in 0..10 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.log_turn("1001", "Alice", &format!("q{i}"), "a").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = log.get("1001").await.unwrap().unwrap();
        assert_eq!(record.chat_history.len(), 10);
    }
}
