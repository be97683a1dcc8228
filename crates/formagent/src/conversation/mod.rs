//! Conversation memory: types, topic extraction, storage, and the
//! history service that chat/form handlers talk to.

pub mod id;
pub mod repository;
pub mod service;
pub mod topics;
pub mod types;

pub use id::{ConversationId, InvalidConversationId};
pub use repository::{
    ConversationRepository, JsonFileRepository, MemoryRepository, RepositoryError,
};
pub use service::{
    AddMessageOutcome, ContextMessage, ConversationContext, ConversationHistoryService, Greeting,
    MessageIdGenerator,
};
pub use types::{
    Conversation, ConversationMetadata, ConversationStatus, ConversationType, FormSummary,
    LongTermMemory, Message, Role, TopicMention, UserPreferences, UserType, estimate_tokens,
};
