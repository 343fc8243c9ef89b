//! Model Context Protocol store
//!
//! Typed context and memory items, the protocol aggregate that owns them, and
//! the two managers that build items and score them.

mod context_manager;
mod item;
mod memory_manager;
mod protocol;

pub use context_manager::{
    ContextBuckets, ContextManager, ASSISTANT_MESSAGE_RELEVANCE, DEFAULT_CONVERSATION_LIMIT,
    DEFAULT_RELEVANT_LIMIT, GITHUB_RELEVANCE, RAG_RELEVANCE, RELEVANCE_BOOST, RELEVANCE_DECAY,
    USER_MESSAGE_RELEVANCE,
};
pub use item::{
    clamp_score, Content, ContextItem, ContextItemUpdate, ContextType, MemoryItem,
    MemoryItemUpdate, MemoryType, Metadata, MAX_SCORE, MIN_SCORE,
};
pub use memory_manager::{
    MemoryManager, DEFAULT_FORGET_AFTER_DAYS, DEFAULT_IMPORTANT_LIMIT, FACT_IMPORTANCE,
    PATTERN_IMPORTANCE, PREFERENCE_IMPORTANCE, RETENTION_IMPORTANCE,
};
pub use protocol::{Context, Memory, Protocol, SharedProtocol, PROTOCOL_VERSION};
