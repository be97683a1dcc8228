//! Conversation identifiers
//!
//! Clients pick their own conversation ids and the file repository uses
//! them verbatim as document file names, so validation enforces a
//! file-safe shape rather than a generic token: ASCII alphanumerics
//! plus `_`/`-`, a leading alphanumeric (rules out hidden files and
//! option-looking names like `-rf`), and a 64-char cap that keeps the
//! name plus the `.json` suffix comfortably portable.

use thiserror::Error;

/// Longest accepted conversation id
const MAX_ID_CHARS: usize = 64;

/// Rejection with the specific rule that failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid conversation id: {reason}")]
pub struct InvalidConversationId {
    pub reason: &'static str,
}

impl InvalidConversationId {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// A conversation id that is safe to use as a document file name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), InvalidConversationId> {
        let Some(first) = s.chars().next() else {
            return Err(InvalidConversationId::new("must not be empty"));
        };
        if !first.is_ascii_alphanumeric() {
            return Err(InvalidConversationId::new(
                "must start with an ASCII letter or digit",
            ));
        }
        if s.len() > MAX_ID_CHARS {
            return Err(InvalidConversationId::new("longer than 64 characters"));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(InvalidConversationId::new(
                "only ASCII letters, digits, '_' and '-' are allowed",
            ));
        }
        Ok(())
    }
}

impl TryFrom<&str> for ConversationId {
    type Error = InvalidConversationId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(ConversationId(value.to_string()))
    }
}

impl TryFrom<String> for ConversationId {
    type Error = InvalidConversationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(&value)?;
        Ok(ConversationId(value))
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_file_safe_ids() {
        for id in ["conv-abc", "CONV_123", "a", "7", "x".repeat(64).as_str()] {
            assert!(ConversationId::try_from(id).is_ok(), "rejected {id:?}");
        }
    }

    #[test]
    fn test_rejects_empty() {
        let err = ConversationId::try_from("").unwrap_err();
        assert!(err.reason.contains("empty"));
    }

    #[test]
    fn test_rejects_non_alphanumeric_lead() {
        // Would render as a hidden file or an option-like name
        for id in ["-rf", "_private", ".hidden"] {
            let err = ConversationId::try_from(id).unwrap_err();
            assert!(err.reason.contains("start"), "wrong reason for {id:?}");
        }
    }

    #[test]
    fn test_rejects_path_and_charset_tricks() {
        for id in ["a/../b", "a b", "a.json", "tiếng-việt", "a\0b"] {
            assert!(ConversationId::try_from(id).is_err(), "accepted {id:?}");
        }
    }

    #[test]
    fn test_length_boundary() {
        assert!(ConversationId::try_from("x".repeat(64).as_str()).is_ok());
        let err = ConversationId::try_from("x".repeat(65).as_str()).unwrap_err();
        assert!(err.reason.contains("64"));
    }

    #[test]
    fn test_display_matches_input() {
        let id = ConversationId::try_from("conv-1").unwrap();
        assert_eq!(id.as_str(), "conv-1");
        assert_eq!(id.to_string(), "conv-1");
    }
}
