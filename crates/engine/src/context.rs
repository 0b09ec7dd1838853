//! The per-request conversational context.

use serde::{Deserialize, Serialize};
use tutorlink_core::message::{trim_history, Message};
use tutorlink_core::personalization::PersonalizationContext;

/// Longest history kept for one request.
pub const MAX_HISTORY_TURNS: usize = 50;

/// Conversation turns, the current message, and the normalized profile.
/// Built once per request and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Prior turns, oldest first
    pub history: Vec<Message>,
    pub current_message: String,
    pub personalization: PersonalizationContext,
}

impl ConversationContext {
    /// Build a context, dropping empty turns and keeping the most recent
    /// [`MAX_HISTORY_TURNS`].
    pub fn new(
        history: &[Message],
        current_message: impl Into<String>,
        personalization: PersonalizationContext,
    ) -> Self {
        Self {
            history: trim_history(history, MAX_HISTORY_TURNS),
            current_message: current_message.into(),
            personalization,
        }
    }

    /// The last `window` turns.
    pub fn recent(&self, window: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    /// History plus the current message as a user turn, for the tool.
    pub fn full_history(&self) -> Vec<Message> {
        let mut turns = self.history.clone();
        if !self.current_message.trim().is_empty() {
            turns.push(Message::user(self.current_message.clone()));
        }
        turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_tail() {
        let history: Vec<Message> = (0..10).map(|i| Message::user(format!("turn {i}"))).collect();
        let ctx = ConversationContext::new(&history, "now", PersonalizationContext::default());
        let recent = ctx.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "turn 7");
        assert_eq!(ctx.recent(100).len(), 10);
    }

    #[test]
    fn history_is_capped() {
        let history: Vec<Message> = (0..80).map(|i| Message::user(format!("t{i}"))).collect();
        let ctx = ConversationContext::new(&history, "now", PersonalizationContext::default());
        assert_eq!(ctx.history.len(), MAX_HISTORY_TURNS);
        assert_eq!(ctx.history[0].content, "t30");
        assert_eq!(ctx.full_history().last().unwrap().content, "now");
    }
}
