//! Bounded conversational memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::protocol::Payload;

/// Turns kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 10;

/// One turn of conversation history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemoryTurn {
    /// Free-form role: "user", "system", "assistant", ...
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Payload>,
}

/// Conversational memory owned by a single agent.
pub trait Memory: Send {
    /// Append a turn, dropping the oldest turns beyond capacity.
    fn add_message(&mut self, role: &str, content: &str, metadata: Option<Payload>);

    /// Snapshot of the turns, oldest first.
    fn context(&self) -> Vec<MemoryTurn>;

    /// Shallow-merge `partial` into the user context; later keys win.
    fn update_user_context(&mut self, partial: Payload);

    fn user_context(&self) -> &Payload;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sliding-window memory: the most recent `capacity` turns plus a user-context map.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConversationMemory {
    turns: VecDeque<MemoryTurn>,
    user_context: Payload,
    capacity: usize,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            user_context: Payload::new(),
            capacity,
        }
    }

}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory for ConversationMemory {
    fn add_message(&mut self, role: &str, content: &str, metadata: Option<Payload>) {
        self.turns.push_back(MemoryTurn {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            metadata,
        });

        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    fn context(&self) -> Vec<MemoryTurn> {
        self.turns.iter().cloned().collect()
    }

    fn update_user_context(&mut self, partial: Payload) {
        for (key, value) in partial {
            self.user_context.insert(key, value);
        }
    }

    fn user_context(&self) -> &Payload {
        &self.user_context
    }

    fn len(&self) -> usize {
        self.turns.len()
    }
}
