use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A single chat line. Immutable once created; the hub keeps recent ones
/// in its history buffer for replay to late joiners.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub timestamp: DateTime<Local>,
    pub author: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            author: author.into(),
            content: content.into(),
        }
    }

    /// Wire rendering: `[HH:MM:SS] author: content`.
    pub fn render(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.author,
            self.content
        )
    }
}
