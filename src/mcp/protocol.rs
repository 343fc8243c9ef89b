//! The protocol store: aggregate root for context and memory

use super::item::{
    clamp_score, ContextItem, ContextItemUpdate, ContextType, MemoryItem, MemoryItemUpdate,
    MemoryType, Metadata,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Version tag stamped on both aggregates
pub const PROTOCOL_VERSION: &str = "1.0";

/// Protocol shared between managers and request handlers
pub type SharedProtocol = Arc<RwLock<Protocol>>;

/// Ordered context items plus bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct Context {
    /// Items in arrival order
    pub items: Vec<ContextItem>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: String,
}

/// Ordered memory items plus bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct Memory {
    /// Items in arrival order
    pub items: Vec<MemoryItem>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: String,
}

impl Context {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            items: Vec::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

impl Memory {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            items: Vec::new(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}

/// Owns the context and memory aggregates.
///
/// All operations are synchronous and in-memory. Share it across tasks with
/// [`Protocol::shared`]; the managers take the lock once per operation.
#[derive(Debug, Clone, Serialize)]
pub struct Protocol {
    context: Context,
    memory: Memory,
}

impl Protocol {
    /// Create a protocol with both aggregates empty
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            context: Context::empty(now),
            memory: Memory::empty(now),
        }
    }

    /// Wrap a fresh protocol for sharing
    pub fn shared() -> SharedProtocol {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    // ─── Context ────────────────────────────────────────────────────

    /// Append a context item. Ids are not checked for uniqueness.
    pub fn add_context_item(&mut self, item: ContextItem) {
        debug!(id = item.id(), kind = %item.kind(), "adding context item");
        self.context.items.push(item);
        self.context.updated_at = Utc::now();
    }

    /// Items in insertion order, optionally restricted to one type
    pub fn context_items(&self, kind: Option<&ContextType>) -> Vec<&ContextItem> {
        self.context
            .items
            .iter()
            .filter(|item| kind.map_or(true, |k| item.kind() == k))
            .collect()
    }

    /// First item carrying `id`
    pub fn context_item(&self, id: &str) -> Option<&ContextItem> {
        self.context.items.iter().find(|item| item.id() == id)
    }

    /// Apply `update` to the first item with `id`. Returns false, and changes
    /// nothing, when no item matches.
    pub fn update_context_item(&mut self, id: &str, update: ContextItemUpdate) -> bool {
        let Some(item) = self.context.items.iter_mut().find(|item| item.id() == id) else {
            trace!(id, "context item not found for update");
            return false;
        };
        let now = Utc::now();
        item.apply(update, now);
        self.context.updated_at = now;
        true
    }

    /// Recompute relevance in one pass. `score` returns the new score for an
    /// item, or `None` to leave it untouched. Returns how many items changed.
    pub fn rescore_context<F>(&mut self, mut score: F) -> usize
    where
        F: FnMut(&ContextItem) -> Option<f64>,
    {
        let now = Utc::now();
        let mut rescored = 0;
        for item in &mut self.context.items {
            if let Some(new_score) = score(item) {
                item.apply(
                    ContextItemUpdate::new().relevance_score(clamp_score(new_score)),
                    now,
                );
                rescored += 1;
            }
        }
        if rescored > 0 {
            self.context.updated_at = now;
        }
        rescored
    }

    /// Top `limit` items by relevance, highest first. Ties keep insertion order.
    ///
    /// `_query` is not consulted: scores must already have been computed for
    /// the query by [`ContextManager::update_relevance_scores`](super::ContextManager::update_relevance_scores).
    pub fn relevant_context(&self, _query: &str, limit: usize) -> Vec<&ContextItem> {
        let mut ranked: Vec<&ContextItem> = self.context.items.iter().collect();
        ranked.sort_by(|a, b| b.relevance_score().total_cmp(&a.relevance_score()));
        ranked.truncate(limit);
        ranked
    }

    pub fn context_len(&self) -> usize {
        self.context.items.len()
    }

    // ─── Memory ─────────────────────────────────────────────────────

    /// Append a memory item. Ids are not checked for uniqueness.
    pub fn add_memory_item(&mut self, item: MemoryItem) {
        debug!(id = item.id(), kind = %item.kind(), "adding memory item");
        self.memory.items.push(item);
        self.memory.updated_at = Utc::now();
    }

    /// Items in insertion order, optionally restricted to one type
    pub fn memory_items(&self, kind: Option<&MemoryType>) -> Vec<&MemoryItem> {
        self.memory
            .items
            .iter()
            .filter(|item| kind.map_or(true, |k| item.kind() == k))
            .collect()
    }

    /// First item carrying `id`
    pub fn memory_item(&self, id: &str) -> Option<&MemoryItem> {
        self.memory.items.iter().find(|item| item.id() == id)
    }

    /// Apply `update` to the first item with `id`, recording the access.
    /// Returns false, and changes nothing, when no item matches.
    pub fn update_memory_item(&mut self, id: &str, update: MemoryItemUpdate) -> bool {
        let Some(item) = self.memory.items.iter_mut().find(|item| item.id() == id) else {
            trace!(id, "memory item not found for update");
            return false;
        };
        let now = Utc::now();
        item.apply(update, now);
        self.memory.updated_at = now;
        true
    }

    /// Top `limit` memories by importance, highest first. Ties keep insertion order.
    pub fn important_memories(&self, limit: usize) -> Vec<&MemoryItem> {
        let mut ranked: Vec<&MemoryItem> = self.memory.items.iter().collect();
        ranked.sort_by(|a, b| b.importance_score().total_cmp(&a.importance_score()));
        ranked.truncate(limit);
        ranked
    }

    /// Keep only the memories for which `keep` holds; returns how many were dropped
    pub fn retain_memories<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&MemoryItem) -> bool,
    {
        let before = self.memory.items.len();
        self.memory.items.retain(keep);
        let removed = before - self.memory.items.len();
        if removed > 0 {
            self.memory.updated_at = Utc::now();
        }
        removed
    }

    pub fn memory_len(&self) -> usize {
        self.memory.items.len()
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new()
    }
}
