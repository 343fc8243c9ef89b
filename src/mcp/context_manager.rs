//! Context Manager
//!
//! Turns GitHub payloads, knowledge-base text and chat turns into context
//! items with preset source and relevance conventions, and keeps relevance
//! scores in step with the latest query.

use super::item::{origin_metadata, Content, ContextItem, ContextType};
use super::protocol::SharedProtocol;
use tracing::debug;

/// Initial relevance for GitHub snapshots
pub const GITHUB_RELEVANCE: f64 = 0.8;
/// Initial relevance for knowledge-base context
pub const RAG_RELEVANCE: f64 = 0.9;
/// Initial relevance for user turns
pub const USER_MESSAGE_RELEVANCE: f64 = 1.0;
/// Initial relevance for assistant turns
pub const ASSISTANT_MESSAGE_RELEVANCE: f64 = 0.7;

/// Relevance gained when an item's text contains the query
pub const RELEVANCE_BOOST: f64 = 0.2;
/// Relevance lost when it does not
pub const RELEVANCE_DECAY: f64 = 0.1;

/// Number of ranked items bucketed per query
pub const DEFAULT_RELEVANT_LIMIT: usize = 5;
/// Number of chat turns returned as recent conversation
pub const DEFAULT_CONVERSATION_LIMIT: usize = 10;

/// Ranked context contents grouped by origin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBuckets {
    pub github: Vec<Content>,
    pub rag: Vec<Content>,
    /// User and assistant turns
    pub conversation: Vec<Content>,
    /// Caller-defined context types
    pub other: Vec<Content>,
}

impl ContextBuckets {
    pub fn is_empty(&self) -> bool {
        self.github.is_empty()
            && self.rag.is_empty()
            && self.conversation.is_empty()
            && self.other.is_empty()
    }
}

/// Builds context items and pushes them through the shared protocol
#[derive(Debug, Clone)]
pub struct ContextManager {
    protocol: SharedProtocol,
    relevant_limit: usize,
}

impl ContextManager {
    pub fn new(protocol: SharedProtocol) -> Self {
        Self {
            protocol,
            relevant_limit: DEFAULT_RELEVANT_LIMIT,
        }
    }

    /// Set how many ranked items [`relevant_context_for_query`](Self::relevant_context_for_query) considers
    pub fn with_relevant_limit(mut self, limit: usize) -> Self {
        self.relevant_limit = limit;
        self
    }

    pub fn protocol(&self) -> SharedProtocol {
        self.protocol.clone()
    }

    async fn push(&self, item: ContextItem) -> String {
        let id = item.id().to_string();
        self.protocol.write().await.add_context_item(item);
        id
    }

    /// Record a GitHub profile snapshot
    pub async fn add_github_context(&self, data: impl Into<Content>) -> String {
        let item = ContextItem::new(ContextType::Github, data, "github")
            .with_metadata(origin_metadata("github_api", "repository_info"))
            .with_relevance(GITHUB_RELEVANCE);
        self.push(item).await
    }

    /// Record knowledge-base context
    pub async fn add_rag_context(&self, data: impl Into<Content>) -> String {
        let item = ContextItem::new(ContextType::Rag, data, "rag")
            .with_metadata(origin_metadata("local_content", "rag_search"))
            .with_relevance(RAG_RELEVANCE);
        self.push(item).await
    }

    /// Record a user turn
    pub async fn add_user_message(&self, message: impl Into<String>) -> String {
        let item = ContextItem::new(ContextType::UserMessage, message.into(), "user")
            .with_metadata(origin_metadata("user_input", "message"))
            .with_relevance(USER_MESSAGE_RELEVANCE);
        self.push(item).await
    }

    /// Record an assistant turn
    pub async fn add_assistant_message(&self, message: impl Into<String>) -> String {
        let item = ContextItem::new(ContextType::AssistantMessage, message.into(), "assistant")
            .with_metadata(origin_metadata("assistant", "message"))
            .with_relevance(ASSISTANT_MESSAGE_RELEVANCE);
        self.push(item).await
    }

    /// Most recently created chat turns, newest first, regardless of role
    pub async fn conversation_context(&self, limit: usize) -> Vec<ContextItem> {
        let protocol = self.protocol.read().await;
        let mut messages: Vec<ContextItem> = protocol
            .context_items(None)
            .into_iter()
            .filter(|item| item.kind().is_conversation())
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        messages.truncate(limit);
        messages
    }

    /// Highest-ranked context grouped by origin.
    ///
    /// Reads precomputed scores; call [`update_relevance_scores`](Self::update_relevance_scores)
    /// with the same query first.
    pub async fn relevant_context_for_query(&self, query: &str) -> ContextBuckets {
        let protocol = self.protocol.read().await;
        let mut buckets = ContextBuckets::default();

        for item in protocol.relevant_context(query, self.relevant_limit) {
            let content = item.content().clone();
            match item.kind() {
                ContextType::Github => buckets.github.push(content),
                ContextType::Rag => buckets.rag.push(content),
                ContextType::UserMessage | ContextType::AssistantMessage => {
                    buckets.conversation.push(content)
                }
                ContextType::Other(_) => buckets.other.push(content),
            }
        }

        buckets
    }

    /// Raise the relevance of text items containing `query` and decay the rest.
    /// Non-text items keep their score. Returns how many items were rescored.
    pub async fn update_relevance_scores(&self, query: &str) -> usize {
        let needle = query.to_lowercase();
        let mut protocol = self.protocol.write().await;
        let rescored = protocol.rescore_context(|item| {
            item.content().as_text()?;
            let current = item.relevance_score();
            if item.content().text_contains(&needle) {
                Some(current + RELEVANCE_BOOST)
            } else {
                Some(current - RELEVANCE_DECAY)
            }
        });
        debug!(query, rescored, "updated relevance scores");
        rescored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::Protocol;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[tokio::test]
    async fn test_factories_apply_conventions() {
        let manager = ContextManager::new(Protocol::shared());
        let github = manager
            .add_github_context(json!({"username": "dhurkesh", "repositories": []}))
            .await;
        let rag = manager.add_rag_context("EXPERIENCE:\nRust").await;
        let user = manager.add_user_message("hello").await;
        let assistant = manager.add_assistant_message("hi there").await;

        let protocol = manager.protocol();
        let protocol = protocol.read().await;
        let cases = [
            (github, ContextType::Github, "github", 0.8, "github_api"),
            (rag, ContextType::Rag, "rag", 0.9, "local_content"),
            (user, ContextType::UserMessage, "user", 1.0, "user_input"),
            (assistant, ContextType::AssistantMessage, "assistant", 0.7, "assistant"),
        ];
        for (id, kind, source, score, meta_source) in cases {
            let item = protocol.context_item(&id).unwrap();
            assert_eq!(item.kind(), &kind);
            assert_eq!(item.source(), source);
            assert_eq!(item.relevance_score(), score);
            assert_eq!(item.metadata()["source"], json!(meta_source));
        }
    }

    #[tokio::test]
    async fn test_conversation_context_newest_first() {
        let manager = ContextManager::new(Protocol::shared());
        manager.add_user_message("first").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        manager.add_rag_context("not a turn").await;
        manager.add_assistant_message("second").await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        manager.add_user_message("third").await;

        let turns: Vec<String> = manager
            .conversation_context(2)
            .await
            .iter()
            .filter_map(|i| i.content().as_text().map(str::to_string))
            .collect();
        assert_eq!(turns, vec!["third", "second"]);
        assert_eq!(manager.conversation_context(10).await.len(), 3);
    }

    #[tokio::test]
    async fn test_relevance_update_boosts_and_decays() {
        let manager = ContextManager::new(Protocol::shared());
        let matching = manager.add_assistant_message("Dhurkesh worked at X").await;
        let unrelated = manager.add_assistant_message("The weather is nice").await;
        let structured = manager.add_github_context(json!({"username": "dhurkesh"})).await;

        assert_eq!(manager.update_relevance_scores("DHURKESH").await, 2);

        let protocol = manager.protocol();
        let protocol = protocol.read().await;
        assert!(approx(protocol.context_item(&matching).unwrap().relevance_score(), 0.9));
        assert!(approx(protocol.context_item(&unrelated).unwrap().relevance_score(), 0.6));
        assert_eq!(protocol.context_item(&structured).unwrap().relevance_score(), 0.8);
    }

    #[tokio::test]
    async fn test_relevance_update_respects_bounds() {
        let manager = ContextManager::new(Protocol::shared());
        let user = manager.add_user_message("tell me about rust").await;
        for _ in 0..12 {
            manager.update_relevance_scores("python").await;
        }
        manager.update_relevance_scores("rust").await;
        manager.update_relevance_scores("rust").await;

        let protocol = manager.protocol();
        let protocol = protocol.read().await;
        assert!(approx(protocol.context_item(&user).unwrap().relevance_score(), 0.4));

        drop(protocol);
        for _ in 0..10 {
            manager.update_relevance_scores("rust").await;
        }
        let protocol = manager.protocol();
        let protocol = protocol.read().await;
        assert_eq!(protocol.context_item(&user).unwrap().relevance_score(), 1.0);
    }

    #[tokio::test]
    async fn test_buckets_route_unknown_types_to_other() {
        let protocol = Protocol::shared();
        let manager = ContextManager::new(protocol.clone());
        manager.add_github_context(json!({"username": "d"})).await;
        manager.add_rag_context("kb").await;
        manager.add_user_message("q").await;
        protocol.write().await.add_context_item(
            ContextItem::new(ContextType::Other("linkedin".into()), "post", "linkedin")
                .with_relevance(0.95),
        );

        let buckets = manager.relevant_context_for_query("q").await;
        assert_eq!(buckets.github.len(), 1);
        assert_eq!(buckets.rag, vec![Content::from("kb")]);
        assert_eq!(buckets.conversation, vec![Content::from("q")]);
        assert_eq!(buckets.other, vec![Content::from("post")]);
    }

    #[tokio::test]
    async fn test_buckets_limited_to_top_ranked() {
        let manager = ContextManager::new(Protocol::shared()).with_relevant_limit(2);
        manager.add_assistant_message("low").await;
        manager.add_rag_context("kb").await;
        manager.add_user_message("question").await;

        let buckets = manager.relevant_context_for_query("question").await;
        assert_eq!(buckets.conversation, vec![Content::from("question")]);
        assert_eq!(buckets.rag, vec![Content::from("kb")]);
        assert!(buckets.github.is_empty());
    }
}
