//! Room chat.
//!
//! The backend keeps an ordered log per room and pushes the most recent
//! entries to every subscriber. Clients keep a bounded view of that push,
//! optionally hiding messages created before they joined.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::clock::Millis;

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 256;

/// Recent messages delivered to subscribers.
pub const DEFAULT_CHAT_HISTORY: usize = 50;

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author display name.
    pub author: String,
    /// Message body.
    pub text: String,
    /// Backend timestamp.
    pub created_at_ms: Millis,
}

impl ChatMessage {
    pub fn new(author: &str, text: &str, created_at_ms: Millis) -> Self {
        ChatMessage {
            author: author.to_string(),
            text: text.to_string(),
            created_at_ms,
        }
    }
}

/// Trims and caps a submitted message. Returns `None` for blank input.
pub fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_MESSAGE_LENGTH).collect())
}

/// Backend-side ordered log, bounded to the most recent entries.
#[derive(Debug, Clone)]
pub struct ChatLog {
    history: VecDeque<ChatMessage>,
    max_history: usize,
    last_created_at: Millis,
}

impl Default for ChatLog {
    fn default() -> Self {
        ChatLog::new(DEFAULT_CHAT_HISTORY)
    }
}

impl ChatLog {
    pub fn new(max_history: usize) -> Self {
        ChatLog {
            history: VecDeque::with_capacity(max_history),
            max_history: max_history.max(1),
            last_created_at: Millis::MIN,
        }
    }

    /// Appends a message. Timestamps never go backwards within a log.
    pub fn append(&mut self, author: &str, text: &str, now_ms: Millis) -> Option<ChatMessage> {
        let text = normalize_text(text)?;
        let created_at = now_ms.max(self.last_created_at);
        self.last_created_at = created_at;
        let message = ChatMessage::new(author.trim(), &text, created_at);
        self.history.push_back(message.clone());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        Some(message)
    }

    /// Recent messages, oldest first.
    pub fn recent(&self) -> Vec<ChatMessage> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Client-side view of the pushed log.
#[derive(Debug, Clone)]
pub struct ChatView {
    messages: Vec<ChatMessage>,
    max_history: usize,
    visible_from_ms: Option<Millis>,
}

impl ChatView {
    /// `visible_from_ms` hides messages created earlier; `None` shows all.
    pub fn new(max_history: usize, visible_from_ms: Option<Millis>) -> Self {
        ChatView {
            messages: Vec::new(),
            max_history: max_history.max(1),
            visible_from_ms,
        }
    }

    /// Replaces the view with a fresh push, oldest first.
    pub fn replace(&mut self, pushed: Vec<ChatMessage>) {
        let mut visible: Vec<ChatMessage> = pushed
            .into_iter()
            .filter(|m| self.visible_from_ms.map_or(true, |from| m.created_at_ms >= from))
            .collect();
        if visible.len() > self.max_history {
            visible.drain(..visible.len() - self.max_history);
        }
        self.messages = visible;
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn latest(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded_and_ordered() {
        let mut log = ChatLog::new(3);
        for i in 0..5 {
            log.append("Azure", &format!("Message {i}"), 1_000 + i).unwrap();
        }
        let recent = log.recent();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "Message 2");
        assert_eq!(recent[2].text, "Message 4");
    }

    #[test]
    fn log_ignores_blank_and_caps_length() {
        let mut log = ChatLog::default();
        assert!(log.append("Azure", "   ", 1).is_none());
        let long = "x".repeat(MAX_MESSAGE_LENGTH + 10);
        let msg = log.append("Azure", &long, 2).unwrap();
        assert_eq!(msg.text.chars().count(), MAX_MESSAGE_LENGTH);
    }

    #[test]
    fn log_timestamps_do_not_regress() {
        let mut log = ChatLog::default();
        log.append("a", "one", 5_000).unwrap();
        let second = log.append("a", "two", 4_000).unwrap();
        assert_eq!(second.created_at_ms, 5_000);
    }

    #[test]
    fn view_hides_pre_join_history() {
        let mut view = ChatView::new(50, Some(10_000));
        view.replace(vec![
            ChatMessage::new("a", "old", 9_999),
            ChatMessage::new("b", "fresh", 10_000),
            ChatMessage::new("a", "newer", 12_000),
        ]);
        let texts: Vec<_> = view.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["fresh", "newer"]);
    }

    #[test]
    fn view_keeps_most_recent() {
        let mut view = ChatView::new(2, None);
        view.replace(vec![
            ChatMessage::new("a", "1", 1),
            ChatMessage::new("a", "2", 2),
            ChatMessage::new("a", "3", 3),
        ]);
        assert_eq!(view.messages().len(), 2);
        assert_eq!(view.latest().unwrap().text, "3");
    }
}
