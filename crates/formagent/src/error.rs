//! Error types for FormAgent

use thiserror::Error;

use crate::conversation::repository::RepositoryError;

/// Main error type for FormAgent operations
#[derive(Error, Debug)]
pub enum FormAgentError {
    /// Configuration errors (missing credentials, bad listen address, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conversation storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Conversation state errors
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// Server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<RepositoryError> for FormAgentError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DuplicateMessageId(id) => {
                FormAgentError::Conversation(format!("duplicate message id: {id}"))
            }
            RepositoryError::Unavailable(msg) => FormAgentError::Storage(msg),
            RepositoryError::Serialization(msg) => FormAgentError::Serialization(msg),
        }
    }
}

/// Result type alias for FormAgent operations
pub type Result<T> = std::result::Result<T, FormAgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_map_to_domain_variants() {
        let dup: FormAgentError = RepositoryError::DuplicateMessageId("msg-42".into()).into();
        assert!(matches!(dup, FormAgentError::Conversation(ref msg) if msg.contains("msg-42")));

        let down: FormAgentError = RepositoryError::Unavailable("disk gone".into()).into();
        assert!(matches!(down, FormAgentError::Storage(ref msg) if msg == "disk gone"));

        let bad: FormAgentError = RepositoryError::Serialization("truncated".into()).into();
        assert!(matches!(bad, FormAgentError::Serialization(ref msg) if msg == "truncated"));
    }
}
