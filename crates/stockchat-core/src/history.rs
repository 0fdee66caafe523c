use std::collections::VecDeque;

use crate::message::ChatMessage;

/// Number of recent messages replayed to a newly joined participant.
pub const HISTORY_CAPACITY: usize = 50;

/// Bounded FIFO store of recent chat messages. Oldest entries are evicted
/// once the capacity is exceeded. Owned and mutated only by the hub loop.
#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.entries.push_back(message);
        while self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_front();
        }
    }

    /// Stored order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
