//! Memory system - bounded per-agent conversation history.

pub mod store;

pub use store::{ConversationMemory, Memory, MemoryTurn, DEFAULT_CAPACITY};
