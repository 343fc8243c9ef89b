//! Memory Manager
//!
//! Remembers facts, preferences and interaction patterns, looks them up by
//! keyword, and ages out stale low-importance memories.

use super::item::{origin_metadata, Content, MemoryItem, MemoryItemUpdate, MemoryType};
use super::protocol::SharedProtocol;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Default importance of a remembered fact
pub const FACT_IMPORTANCE: f64 = 0.8;
/// Importance of a user preference
pub const PREFERENCE_IMPORTANCE: f64 = 0.9;
/// Importance of an interaction pattern
pub const PATTERN_IMPORTANCE: f64 = 0.7;

/// Memories above this importance are never forgotten
pub const RETENTION_IMPORTANCE: f64 = 0.8;
/// Default age, in whole days, after which memories may be forgotten
pub const DEFAULT_FORGET_AFTER_DAYS: i64 = 30;
/// Default number of memories returned by importance ranking
pub const DEFAULT_IMPORTANT_LIMIT: usize = 5;

/// Builds memory items and pushes them through the shared protocol
#[derive(Debug, Clone)]
pub struct MemoryManager {
    protocol: SharedProtocol,
}

impl MemoryManager {
    pub fn new(protocol: SharedProtocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> SharedProtocol {
        self.protocol.clone()
    }

    async fn remember(&self, kind: MemoryType, content: Content, importance: f64) -> String {
        let data_type = kind.as_str().to_string();
        let item = MemoryItem::new(kind, content)
            .with_metadata(origin_metadata("user_interaction", &data_type))
            .with_importance(importance);
        let id = item.id().to_string();
        self.protocol.write().await.add_memory_item(item);
        id
    }

    /// Remember a fact at the default importance
    pub async fn add_important_fact(&self, fact: impl Into<String>) -> String {
        self.add_important_fact_with_importance(fact, FACT_IMPORTANCE)
            .await
    }

    pub async fn add_important_fact_with_importance(
        &self,
        fact: impl Into<String>,
        importance: f64,
    ) -> String {
        self.remember(MemoryType::Fact, Content::Text(fact.into()), importance)
            .await
    }

    pub async fn add_user_preference(&self, preference: impl Into<Content>) -> String {
        self.remember(MemoryType::Preference, preference.into(), PREFERENCE_IMPORTANCE)
            .await
    }

    pub async fn add_interaction_pattern(&self, pattern: impl Into<Content>) -> String {
        self.remember(MemoryType::Pattern, pattern.into(), PATTERN_IMPORTANCE)
            .await
    }

    /// Memories whose text, or any text value of their mapping, contains
    /// `query` ignoring case. Original order, unranked.
    pub async fn relevant_memories(&self, query: &str) -> Vec<MemoryItem> {
        let needle = query.to_lowercase();
        let protocol = self.protocol.read().await;
        protocol
            .memory_items(None)
            .into_iter()
            .filter(|memory| memory.content().text_or_values_contain(&needle))
            .cloned()
            .collect()
    }

    /// Set a memory's importance. False when the id is unknown.
    pub async fn update_memory_importance(&self, id: &str, importance: f64) -> bool {
        self.protocol
            .write()
            .await
            .update_memory_item(id, MemoryItemUpdate::new().importance_score(importance))
    }

    pub async fn important_memories(&self, limit: usize) -> Vec<MemoryItem> {
        self.protocol
            .read()
            .await
            .important_memories(limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Drop memories older than `days_threshold` whole days unless their
    /// importance exceeds [`RETENTION_IMPORTANCE`]. Returns the number removed.
    pub async fn forget_old_memories(&self, days_threshold: i64) -> usize {
        self.forget_old_memories_at(Utc::now(), days_threshold).await
    }

    /// [`forget_old_memories`](Self::forget_old_memories) against an explicit clock
    pub async fn forget_old_memories_at(&self, now: DateTime<Utc>, days_threshold: i64) -> usize {
        let mut protocol = self.protocol.write().await;
        let forgotten = protocol.retain_memories(|memory| {
            memory.age_days(now) <= days_threshold
                || memory.importance_score() > RETENTION_IMPORTANCE
        });
        if forgotten > 0 {
            info!(forgotten, days_threshold, "forgot old memories");
        } else {
            debug!(days_threshold, "no memories old enough to forget");
        }
        forgotten
    }
}
