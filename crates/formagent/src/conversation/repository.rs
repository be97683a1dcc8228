//! Conversation persistence
//!
//! The repository seam makes storage degradation explicit: the service
//! talks to a `ConversationRepository` chosen at construction time, and
//! a persistence failure never reaches the user. Two implementations
//! ship: a process-local in-memory map and a JSON-document-per-
//! conversation file store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

use crate::conversation::types::{Conversation, ConversationStatus};

/// Errors surfaced by conversation repositories
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The document contains a repeated message id
    #[error("duplicate message id: {0}")]
    DuplicateMessageId(String),

    /// The backing store cannot be reached
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The stored document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage seam for conversation documents
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Load a conversation by id, `None` when it does not exist
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, RepositoryError>;

    /// Persist a conversation document
    ///
    /// Rejects documents whose short-term messages carry duplicate ids
    /// with `RepositoryError::DuplicateMessageId`.
    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError>;

    /// Ids of all conversations currently marked active
    async fn list_active(&self) -> Result<Vec<String>, RepositoryError>;

    /// Archive conversations whose last activity predates the cutoff
    ///
    /// Returns how many conversations transitioned to archived.
    async fn archive_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError>;

    /// Repository name for logging
    fn name(&self) -> &'static str;
}

/// Reject documents with repeated message ids
fn check_unique_message_ids(conversation: &Conversation) -> Result<(), RepositoryError> {
    let mut seen = HashSet::new();
    for message in &conversation.short_term {
        if !seen.insert(message.id.as_str()) {
            return Err(RepositoryError::DuplicateMessageId(message.id.clone()));
        }
    }
    Ok(())
}

/// Process-local repository; state does not outlive the process
#[derive(Default)]
pub struct MemoryRepository {
    conversations: DashMap<String, Conversation>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for MemoryRepository {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        check_unique_message_ids(conversation)?;
        self.conversations
            .insert(conversation.conversation_id.clone(), conversation.clone());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<String>, RepositoryError> {
        let mut ids: Vec<String> = self
            .conversations
            .iter()
            .filter(|entry| entry.value().metadata.status == ConversationStatus::Active)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn archive_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut archived = 0;
        for mut entry in self.conversations.iter_mut() {
            let meta = &mut entry.value_mut().metadata;
            if meta.status == ConversationStatus::Active && meta.last_activity < cutoff {
                meta.status = ConversationStatus::Archived;
                archived += 1;
            }
        }
        Ok(archived)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One JSON document per conversation under a data directory
pub struct JsonFileRepository {
    data_dir: PathBuf,
}

impl JsonFileRepository {
    /// Create a repository rooted at `data_dir`, creating it if needed
    pub async fn new(data_dir: PathBuf) -> Result<Self, RepositoryError> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| RepositoryError::Unavailable(format!("create {data_dir:?}: {e}")))?;
        Ok(Self { data_dir })
    }

    fn path_for(&self, conversation_id: &str) -> PathBuf {
        // Conversation ids are validated at the boundary, so they are
        // safe to use as file names.
        self.data_dir.join(format!("{conversation_id}.json"))
    }

    async fn read_document(&self, path: &PathBuf) -> Result<Option<Conversation>, RepositoryError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let conversation = serde_json::from_slice(&bytes)
                    .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
                Ok(Some(conversation))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepositoryError::Unavailable(e.to_string())),
        }
    }

    async fn write_document(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let path = self.path_for(&conversation.conversation_id);
        let bytes = serde_json::to_vec_pretty(conversation)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        // Write-then-rename so readers never observe a torn document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn all_documents(&self) -> Result<Vec<Conversation>, RepositoryError> {
        let mut entries = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;

        let mut documents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(conversation) = self.read_document(&path).await? {
                documents.push(conversation);
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl ConversationRepository for JsonFileRepository {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>, RepositoryError> {
        self.read_document(&self.path_for(conversation_id)).await
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        check_unique_message_ids(conversation)?;
        self.write_document(conversation).await
    }

    async fn list_active(&self) -> Result<Vec<String>, RepositoryError> {
        let mut ids: Vec<String> = self
            .all_documents()
            .await?
            .into_iter()
            .filter(|c| c.metadata.status == ConversationStatus::Active)
            .map(|c| c.conversation_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn archive_inactive(&self, cutoff: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut archived = 0;
        for mut conversation in self.all_documents().await? {
            let meta = &mut conversation.metadata;
            if meta.status == ConversationStatus::Active && meta.last_activity < cutoff {
                meta.status = ConversationStatus::Archived;
                self.write_document(&conversation).await?;
                archived += 1;
            }
        }
        Ok(archived)
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::conversation::types::{Message, Role};
    use chrono::Duration;

    fn conversation_with_messages(id: &str, ids: &[&str]) -> Conversation {
        let config = MemoryConfig::default();
        let mut conv = Conversation::new(id, "u1", "s1");
        for msg_id in ids {
            conv.push_message(
                Message::new(msg_id.to_string(), Role::User, "hello", 4000),
                &config,
            );
        }
        conv
    }

    #[tokio::test]
    async fn test_memory_repository_round_trip() {
        let repo = MemoryRepository::new();
        let conv = conversation_with_messages("c1", &["m1", "m2"]);

        repo.save(&conv).await.unwrap();
        let loaded = repo.load("c1").await.unwrap().expect("exists");
        assert_eq!(loaded, conv);
        assert!(repo.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_repository_rejects_duplicate_ids() {
        let repo = MemoryRepository::new();
        let conv = conversation_with_messages("c1", &["m1", "m1"]);

        let err = repo.save(&conv).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateMessageId(_)));
    }

    #[tokio::test]
    async fn test_memory_repository_archive_sweep() {
        let repo = MemoryRepository::new();
        let mut old = conversation_with_messages("old", &["m1"]);
        old.metadata.last_activity = Utc::now() - Duration::hours(48);
        let fresh = conversation_with_messages("fresh", &["m2"]);

        repo.save(&old).await.unwrap();
        repo.save(&fresh).await.unwrap();

        let archived = repo
            .archive_inactive(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(archived, 1);

        let active = repo.list_active().await.unwrap();
        assert_eq!(active, vec!["fresh".to_string()]);

        // Sweep is idempotent
        let archived_again = repo
            .archive_inactive(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(archived_again, 0);
    }

    #[tokio::test]
    async fn test_json_file_repository_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().to_path_buf())
            .await
            .unwrap();

        let conv = conversation_with_messages("c1", &["m1"]);
        repo.save(&conv).await.unwrap();

        let loaded = repo.load("c1").await.unwrap().expect("exists");
        assert_eq!(loaded, conv);
        assert!(repo.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_repository_archive_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().to_path_buf())
            .await
            .unwrap();

        let mut old = conversation_with_messages("old", &["m1"]);
        old.metadata.last_activity = Utc::now() - Duration::days(30);
        repo.save(&old).await.unwrap();
        repo.save(&conversation_with_messages("fresh", &["m2"]))
            .await
            .unwrap();

        let archived = repo
            .archive_inactive(Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(archived, 1);
        assert_eq!(repo.list_active().await.unwrap(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_json_file_repository_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-dir");
        tokio::fs::write(&file_path, b"x").await.unwrap();

        // data_dir points at a regular file
        let result = JsonFileRepository::new(file_path).await;
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
    }
}
