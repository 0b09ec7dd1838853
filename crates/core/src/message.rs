//! Conversation turn types.
//!
//! A turn is the unit of the caller's conversational record:
//! the caller sends an ordered history → the engine prompts the oracle with
//! the most recent turns → the tool receives the history unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest turn content forwarded into a prompt, in characters.
pub const MAX_TURN_CHARS: usize = 2000;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The student
    User,
    /// The tutoring agent
    Assistant,
    /// Instructions to the oracle
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the turn happened, if the caller recorded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Content cut to [`MAX_TURN_CHARS`] on a char boundary.
    pub fn truncated_content(&self) -> &str {
        match self.content.char_indices().nth(MAX_TURN_CHARS) {
            Some((idx, _)) => &self.content[..idx],
            None => &self.content,
        }
    }
}

/// Keep the last `max_turns` non-empty turns, in original order.
pub fn trim_history(history: &[Message], max_turns: usize) -> Vec<Message> {
    let kept: Vec<&Message> = history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .collect();
    let skip = kept.len().saturating_sub(max_turns);
    kept.into_iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, tutor!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, tutor!");
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn message_deserializes_without_timestamp() {
        let msg: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"Sure!"}"#).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Sure!");
    }

    #[test]
    fn long_content_is_truncated_on_char_boundary() {
        let msg = Message::user("é".repeat(MAX_TURN_CHARS + 10));
        assert_eq!(msg.truncated_content().chars().count(), MAX_TURN_CHARS);
    }

    #[test]
    fn trim_history_keeps_most_recent_non_empty() {
        let history = vec![
            Message::user("one"),
            Message::assistant("   "),
            Message::user("two"),
            Message::assistant("three"),
        ];
        let trimmed = trim_history(&history, 2);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].content, "two");
        assert_eq!(trimmed[1].content, "three");
    }
}
