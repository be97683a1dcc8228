//! Conversation history service
//!
//! Single source of truth for session memory: an in-memory cache in
//! front of a `ConversationRepository`, plus greeting/topic logic and
//! the guardrails hook on every inbound message.
//!
//! Concurrency note: two concurrent mutations of the same conversation
//! id race last-write-wins on the cached entry. The original system
//! accepts this; callers needing strict ordering must serialize their
//! own requests.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use lru::LruCache;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{MemoryConfig, PersonalityConfig};
use crate::conversation::id::ConversationId;
use crate::conversation::repository::{ConversationRepository, RepositoryError};
use crate::conversation::types::{
    Conversation, ConversationStatus, ConversationType, FormSummary, Message, Role, TopicMention,
    UserPreferences, UserType,
};
use crate::error::{FormAgentError, Result};
use crate::guardrails::{GuardrailsEngine, SafetyCheck};

/// How many recently issued message ids are remembered for collision checks
const ISSUED_ID_CAPACITY: usize = 1000;

/// Generates process-unique message ids
///
/// Ids combine a millisecond timestamp, a random suffix, and a
/// monotonically increasing counter, so retries after a persistence
/// conflict always produce a fresh id. Recently issued ids are kept in
/// an LRU set as a second line of defense.
pub struct MessageIdGenerator {
    counter: AtomicU64,
    issued: Mutex<LruCache<String, ()>>,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            issued: Mutex::new(LruCache::new(
                NonZeroUsize::new(ISSUED_ID_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    /// Produce the next unique id
    pub fn next_id(&self) -> String {
        loop {
            let position = self.counter.fetch_add(1, Ordering::Relaxed);
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(6)
                .map(char::from)
                .collect();
            let id = format!("msg_{}_{}_{}", Utc::now().timestamp_millis(), suffix, position);

            let mut issued = match self.issued.lock() {
                Ok(guard) => guard,
                Err(_) => return id,
            };
            if issued.put(id.clone(), ()).is_none() {
                return id;
            }
            // Collision within the tracked window: try again
        }
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of adding a message to a conversation
#[derive(Debug)]
pub struct AddMessageOutcome {
    pub message_id: String,
    pub safety: SafetyCheck,
}

/// A short-term message as exposed through the context contract
#[derive(Debug, Clone, Serialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Assembled conversation context handed to chat/form handlers
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    /// Most recent messages within the token budget, oldest first
    pub short_term: Vec<ContextMessage>,
    /// Compacted long-term summary
    pub long_term: String,
    pub user_preferences: UserPreferences,
    /// Top topics by mention frequency, at most five
    pub key_topics: Vec<TopicMention>,
    pub user_type: UserType,
    pub conversation_type: ConversationType,
    /// Personality merge
    pub assistant_name: String,
    pub language: String,
    pub tone: String,
    pub guidelines: Vec<String>,
}

/// A contextual greeting for returning users
#[derive(Debug, Clone, Serialize)]
pub struct Greeting {
    pub greeting: String,
    pub follow_up: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personal_touch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_suggestion: Option<String>,
}

struct CacheEntry {
    conversation: Conversation,
    last_access: DateTime<Utc>,
}

/// Durable+cached conversation state
pub struct ConversationHistoryService {
    repo: Arc<dyn ConversationRepository>,
    cache: DashMap<String, CacheEntry>,
    guardrails: Arc<GuardrailsEngine>,
    ids: MessageIdGenerator,
    memory: MemoryConfig,
    personality: PersonalityConfig,
}

impl ConversationHistoryService {
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        guardrails: Arc<GuardrailsEngine>,
        memory: MemoryConfig,
        personality: PersonalityConfig,
    ) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
            guardrails,
            ids: MessageIdGenerator::new(),
            memory,
            personality,
        }
    }

    /// Load or create a conversation, refreshing its cache entry
    ///
    /// A repository failure degrades to memory-only mode: the caller
    /// gets a working conversation either way.
    pub async fn get_or_create(
        &self,
        id: &ConversationId,
        user_id: &str,
        session_id: &str,
    ) -> Conversation {
        let mut entry = self.cached_entry(id, user_id, session_id).await;
        entry.last_access = Utc::now();
        entry.conversation.clone()
    }

    /// Get a mutable cache entry, (re)loading it if a concurrent
    /// eviction removed it between insert and access
    async fn cached_entry(
        &self,
        id: &ConversationId,
        user_id: &str,
        session_id: &str,
    ) -> dashmap::mapref::one::RefMut<'_, String, CacheEntry> {
        loop {
            if let Some(entry) = self.cache.get_mut(id.as_str()) {
                return entry;
            }
            self.ensure_cached(id, user_id, session_id).await;
        }
    }

    async fn ensure_cached(&self, id: &ConversationId, user_id: &str, session_id: &str) {
        if self.cache.contains_key(id.as_str()) {
            return;
        }

        let loaded = match self.repo.load(id.as_str()).await {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    "Repository ({}) unavailable for {}, continuing memory-only: {e}",
                    self.repo.name(),
                    id
                );
                None
            }
        };

        let conversation =
            loaded.unwrap_or_else(|| Conversation::new(id.as_str(), user_id, session_id));

        // Concurrent loads of the same id race here; last write wins.
        self.cache.insert(
            id.as_str().to_string(),
            CacheEntry {
                conversation,
                last_access: Utc::now(),
            },
        );
    }

    /// Append a message, running guardrails and persisting the result
    ///
    /// The safety check is logged but non-blocking here; handlers decide
    /// whether to reject before calling. A duplicate-id persistence
    /// conflict is retried once with a fresh id.
    pub async fn add_message(
        &self,
        id: &ConversationId,
        role: Role,
        content: &str,
        user_id: &str,
    ) -> Result<AddMessageOutcome> {
        let safety = self.guardrails.check_content_safety(content);
        self.guardrails
            .log_safety_violations(&safety, id.as_str());

        let mut message_id = self.ids.next_id();
        let message = Message::new(
            message_id.clone(),
            role,
            content,
            self.memory.max_content_chars,
        );

        let snapshot = {
            let mut entry = self.cached_entry(id, user_id, "").await;
            entry.conversation.push_message(message, &self.memory);
            entry.last_access = Utc::now();
            entry.conversation.clone()
        };

        match self.repo.save(&snapshot).await {
            Ok(()) => {}
            Err(RepositoryError::DuplicateMessageId(dup)) => {
                debug!("Message id conflict on {dup}, retrying with a fresh id");
                let fresh = self.ids.next_id();
                let retry_snapshot = {
                    let mut entry = self.cached_entry(id, user_id, "").await;
                    if let Some(last) = entry
                        .conversation
                        .short_term
                        .iter_mut()
                        .find(|m| m.id == message_id)
                    {
                        last.id = fresh.clone();
                    }
                    entry.conversation.clone()
                };
                message_id = fresh;
                self.repo
                    .save(&retry_snapshot)
                    .await
                    .map_err(FormAgentError::from)?;
            }
            Err(e) => {
                // Persistence degradation is invisible to the caller
                warn!(
                    "Persist failed on {} ({}), conversation is memory-only: {e}",
                    id,
                    self.repo.name()
                );
            }
        }

        Ok(AddMessageOutcome {
            message_id,
            safety,
        })
    }

    /// Assemble context for a conversation within a token budget
    ///
    /// Short-term messages are taken greedily from newest backward until
    /// the budget is exhausted, then returned in chronological order.
    /// Returns `None` for conversations that do not exist anywhere.
    pub async fn get_context(
        &self,
        id: &ConversationId,
        max_tokens: usize,
    ) -> Option<ConversationContext> {
        let conversation = match self.cache.get(id.as_str()) {
            Some(entry) => entry.conversation.clone(),
            None => match self.repo.load(id.as_str()).await {
                Ok(Some(found)) => found,
                Ok(None) => return None,
                Err(e) => {
                    warn!("Repository unavailable while fetching context for {id}: {e}");
                    return None;
                }
            },
        };

        let mut budget = max_tokens;
        let mut recent = Vec::new();
        for message in conversation.short_term.iter().rev() {
            if message.tokens > budget {
                break;
            }
            budget -= message.tokens;
            recent.push(ContextMessage {
                role: message.role,
                content: message.content.clone(),
                timestamp: message.timestamp,
            });
        }
        recent.reverse();

        Some(ConversationContext {
            short_term: recent,
            long_term: conversation.long_term.summary.clone(),
            user_preferences: conversation.long_term.preferences.clone(),
            key_topics: conversation.long_term.top_topics(5),
            user_type: conversation.metadata.user_type,
            conversation_type: conversation.metadata.conversation_type,
            assistant_name: self.personality.assistant_name.clone(),
            language: self.personality.language.clone(),
            tone: self.personality.tone.clone(),
            guidelines: self.personality.guidelines.clone(),
        })
    }

    /// Record a created form in the conversation's bounded history
    pub async fn record_form_creation(&self, id: &ConversationId, summary: FormSummary) {
        let snapshot = {
            let mut entry = self.cached_entry(id, "", "").await;
            entry
                .conversation
                .record_form(summary, self.memory.max_form_history);
            entry.last_access = Utc::now();
            entry.conversation.clone()
        };

        if let Err(e) = self.repo.save(&snapshot).await {
            warn!("Persist failed while recording form for {id}: {e}");
        }
    }

    /// Build a greeting keyed to the user's familiarity tier
    pub async fn contextual_greeting(&self, id: &ConversationId, user_id: &str) -> Greeting {
        let conversation = self.get_or_create(id, user_id, "").await;
        let name = &self.personality.assistant_name;

        let (greeting, follow_up) = match conversation.metadata.user_type {
            UserType::FirstTime => (
                format!("Xin chào! Mình là {name}, trợ lý giúp bạn tạo form thu thập dữ liệu."),
                "Bạn muốn tạo form gì hôm nay?".to_string(),
            ),
            UserType::Returning => (
                "Chào mừng bạn quay lại!".to_string(),
                "Bạn muốn tiếp tục chỉnh form cũ hay tạo form mới?".to_string(),
            ),
            UserType::Expert => (
                "Chào bạn, rất vui được làm việc cùng bạn lần nữa.".to_string(),
                "Bạn cần mình hỗ trợ thao tác nào trước?".to_string(),
            ),
        };

        let personal_touch = conversation
            .long_term
            .preferences
            .form_history
            .last()
            .map(|form| format!("Lần trước bạn đã tạo form \"{}\".", form.title));

        let topic_suggestion = conversation
            .long_term
            .top_topics(1)
            .first()
            .map(|t| format!("Bạn có muốn tiếp tục với chủ đề {} không?", t.topic));

        Greeting {
            greeting,
            follow_up,
            personal_touch,
            topic_suggestion,
        }
    }

    /// Evict cache entries idle beyond the configured window
    ///
    /// Cache eviction is decoupled from persistent archival; an evicted
    /// entry reloads from the repository on next access.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(self.memory.cache_idle_secs as i64);
        // Count inside the predicate: retain walks shards one at a time,
        // so concurrent inserts make length differencing unreliable.
        let evicted = AtomicUsize::new(0);
        self.cache.retain(|_, entry| {
            let keep = entry.last_access >= cutoff;
            if !keep {
                evicted.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        evicted.into_inner()
    }

    /// Archive conversations inactive beyond the configured window
    pub async fn archive_inactive(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(self.memory.archive_after_secs as i64);

        // Keep cached copies consistent with the repository sweep
        for mut entry in self.cache.iter_mut() {
            let meta = &mut entry.value_mut().conversation.metadata;
            if meta.status == ConversationStatus::Active && meta.last_activity < cutoff {
                meta.status = ConversationStatus::Archived;
            }
        }

        match self.repo.archive_inactive(cutoff).await {
            Ok(archived) => archived,
            Err(e) => {
                warn!("Archival sweep failed: {e}");
                0
            }
        }
    }

    /// Ids of conversations currently active in the repository
    pub async fn active_conversations(&self) -> Vec<String> {
        match self.repo.list_active().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Active listing failed, falling back to cache: {e}");
                let mut ids: Vec<String> = self
                    .cache
                    .iter()
                    .filter(|e| e.conversation.metadata.status == ConversationStatus::Active)
                    .map(|e| e.key().clone())
                    .collect();
                ids.sort();
                ids
            }
        }
    }

    /// Number of conversations currently cached
    pub fn cached_conversations(&self) -> usize {
        self.cache.len()
    }

    /// Run one maintenance sweep (cache eviction + archival)
    pub async fn maintenance_sweep(&self) -> (usize, usize) {
        let now = Utc::now();
        let evicted = self.evict_idle(now);
        let archived = self.archive_inactive(now).await;
        if evicted > 0 || archived > 0 {
            debug!("Maintenance sweep: evicted {evicted} cache entries, archived {archived}");
        }
        (evicted, archived)
    }
}
