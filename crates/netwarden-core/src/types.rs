use serde::{Deserialize, Serialize};
use std::fmt;

/// Messaging-channel chat identifier. Negative values are group chats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Group and supergroup chats carry negative ids.
    pub fn is_group(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ChatId)
    }
}

/// The identity issuing a command.
///
/// Created implicitly on first contact; nothing about it is persisted except
/// the derived ban and rate state keyed by `chat_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub chat_id: ChatId,
    /// Topic id inside a forum-style group, if any.
    pub thread_id: Option<i64>,
    /// Sender's handle, recorded in the audit log only.
    pub display_name: String,
}

impl Principal {
    pub fn new(chat_id: impl Into<ChatId>, thread_id: Option<i64>, display_name: &str) -> Self {
        Self {
            chat_id: chat_id.into(),
            thread_id,
            display_name: display_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_chat_is_group() {
        assert!(ChatId(-100123).is_group());
        assert!(!ChatId(42).is_group());
    }

    #[test]
    fn chat_id_parses_from_config_key() {
        let id: ChatId = " -1001 ".parse().unwrap();
        assert_eq!(id, ChatId(-1001));
        assert!("abc".parse::<ChatId>().is_err());
    }
}
