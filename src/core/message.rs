use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }

    pub fn is_system(self) -> bool {
        self == Role::System
    }
}

/// One turn in a chat transcript.
///
/// A message belongs to exactly one chat for its whole lifetime; `id` and
/// `timestamp` are stamped once at append time and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    /// Set for assistant turns so readers can attribute the reply even after
    /// the character itself was deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    /// Latched to true by the first content edit, never reset.
    #[serde(default)]
    pub is_edited: bool,
}

/// The caller-supplied part of a message; the store stamps id and timestamp.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub character_id: Option<String>,
}

impl MessageDraft {
    pub fn user(chat_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            role: Role::User,
            content: content.into(),
            character_id: None,
        }
    }

    pub fn assistant(
        chat_id: impl Into<String>,
        content: impl Into<String>,
        character_id: Option<String>,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            role: Role::Assistant,
            content: content.into(),
            character_id,
        }
    }
}

/// Current time in epoch milliseconds, the timestamp unit used across the
/// persisted data model.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
