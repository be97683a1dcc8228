//! Conversation data model
//!
//! A conversation holds a bounded short-term message buffer and a
//! compacted long-term memory (summary, topic frequencies, user
//! preferences). Overflowing short-term messages are folded into
//! long-term memory, never discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;
use crate::conversation::topics::extract_topics;

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Convert role to its wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Estimate token count using the ceil(chars/4) heuristic
///
/// Fast approximation for budget management; not a real tokenizer.
pub fn estimate_tokens(content: &str) -> usize {
    content.len().div_ceil(4)
}

/// A single message in short-term memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Process-unique message id
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Estimated token count for the content
    pub tokens: usize,
}

impl Message {
    /// Create a message, capping content at `max_content_chars`
    pub fn new(id: String, role: Role, content: &str, max_content_chars: usize) -> Self {
        let content: String = if content.chars().count() > max_content_chars {
            content.chars().take(max_content_chars).collect()
        } else {
            content.to_string()
        };
        let tokens = estimate_tokens(&content);
        Self {
            id,
            role,
            content,
            timestamp: Utc::now(),
            tokens,
        }
    }
}

/// A topic with its mention frequency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMention {
    pub topic: String,
    pub frequency: u32,
    pub last_mentioned: DateTime<Utc>,
}

/// Summary of a previously created form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub title: String,
    pub field_count: usize,
    pub created_at: DateTime<Utc>,
}

/// User preferences accumulated across a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Previously created forms, newest last, bounded
    pub form_history: Vec<FormSummary>,
    pub language: String,
    pub style: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            form_history: Vec::new(),
            language: "vi".to_string(),
            style: "friendly".to_string(),
        }
    }
}

/// Compacted long-term memory
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LongTermMemory {
    /// Concatenative summary of overflowed messages, bounded
    pub summary: String,
    pub topics: Vec<TopicMention>,
    #[serde(default)]
    pub preferences: UserPreferences,
}

impl LongTermMemory {
    /// Fold an overflowed short-term message into long-term memory
    pub fn absorb(&mut self, message: &Message, max_summary_chars: usize) {
        for topic in extract_topics(&message.content) {
            match self.topics.iter_mut().find(|t| t.topic == topic) {
                Some(mention) => {
                    mention.frequency += 1;
                    mention.last_mentioned = message.timestamp;
                }
                None => self.topics.push(TopicMention {
                    topic: topic.to_string(),
                    frequency: 1,
                    last_mentioned: message.timestamp,
                }),
            }
        }

        let excerpt: String = message.content.chars().take(120).collect();
        self.summary
            .push_str(&format!("[{}] {excerpt}\n", message.role.as_str()));

        // Compact from the front, keeping the newest tail
        let total = self.summary.chars().count();
        if total > max_summary_chars {
            self.summary = self
                .summary
                .chars()
                .skip(total - max_summary_chars)
                .collect();
        }
    }

    /// Top topics ordered by frequency (ties broken by name for determinism)
    pub fn top_topics(&self, limit: usize) -> Vec<TopicMention> {
        let mut topics = self.topics.clone();
        topics.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.topic.cmp(&b.topic)));
        topics.truncate(limit);
        topics
    }
}

/// Classification of what a conversation is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    #[default]
    General,
    FormCreation,
}

/// User familiarity tier, a pure function of total message count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    FirstTime,
    Returning,
    Expert,
}

impl UserType {
    /// Derive the tier from total messages: >50 expert, >10 returning
    pub fn from_total_messages(total: u64) -> Self {
        if total > 50 {
            UserType::Expert
        } else if total > 10 {
            UserType::Returning
        } else {
            UserType::FirstTime
        }
    }
}

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Archived,
}

/// Aggregate conversation counters and lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub total_messages: u64,
    pub total_tokens: u64,
    pub conversation_type: ConversationType,
    pub user_type: UserType,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// A stateful chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub user_id: String,
    pub session_id: String,
    pub short_term: Vec<Message>,
    pub long_term: LongTermMemory,
    pub metadata: ConversationMetadata,
}

impl Conversation {
    /// Create a new conversation with empty memory and default preferences
    pub fn new(conversation_id: &str, user_id: &str, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            short_term: Vec::new(),
            long_term: LongTermMemory::default(),
            metadata: ConversationMetadata {
                total_messages: 0,
                total_tokens: 0,
                conversation_type: ConversationType::default(),
                user_type: UserType::FirstTime,
                status: ConversationStatus::Active,
                created_at: now,
                last_activity: now,
            },
        }
    }

    /// Append a message to short-term memory, compacting overflow
    ///
    /// Maintains the invariant `short_term.len() <= max_messages`:
    /// oldest excess messages are absorbed into long-term memory.
    /// Counters and the derived user type are updated on every call.
    pub fn push_message(&mut self, message: Message, config: &MemoryConfig) {
        self.metadata.total_messages += 1;
        self.metadata.total_tokens += message.tokens as u64;
        self.metadata.last_activity = Utc::now();
        self.metadata.user_type = UserType::from_total_messages(self.metadata.total_messages);

        self.short_term.push(message);

        if self.short_term.len() > config.max_messages {
            let excess = self.short_term.len() - config.max_messages;
            let overflow: Vec<Message> = self.short_term.drain(..excess).collect();
            for old in &overflow {
                self.long_term.absorb(old, config.max_summary_chars);
            }
        }
    }

    /// Record a created form in bounded history and retag the conversation
    pub fn record_form(&mut self, summary: FormSummary, max_form_history: usize) {
        self.long_term.preferences.form_history.push(summary);
        let len = self.long_term.preferences.form_history.len();
        if len > max_form_history {
            self.long_term
                .preferences
                .form_history
                .drain(..len - max_form_history);
        }
        self.metadata.conversation_type = ConversationType::FormCreation;
        self.metadata.last_activity = Utc::now();
    }
}
