//! Assistant turn loop
//!
//! Feeds every inbound message through the context and memory store, builds
//! the system prompt and asks the completer for a reply.

use crate::github::GithubSnapshot;
use crate::knowledge::KnowledgeBase;
use crate::llm::Completer;
use crate::mcp::{
    Content, ContextItem, ContextItemUpdate, ContextManager, MemoryManager, Protocol,
    SharedProtocol,
};
use crate::prompt::PromptBuilder;
use crate::render;
use crate::{AssistantConfig, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Messages mentioning this keyword are remembered as facts
const PROJECT_KEYWORD: &str = "project";

/// One assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Raw model output (markdown)
    pub text: String,
    /// `text` rendered as HTML
    pub html: String,
}

/// Ids of the long-lived source items, so each source is stored once
#[derive(Debug, Default)]
struct RecordedSources {
    github: Option<(String, Content)>,
    rag: Option<String>,
}

/// Personal assistant bound to one knowledge base and one completer
pub struct Assistant<C: Completer> {
    config: AssistantConfig,
    protocol: SharedProtocol,
    context: ContextManager,
    memory: MemoryManager,
    knowledge: KnowledgeBase,
    completer: C,
    sources: Mutex<RecordedSources>,
}

impl<C: Completer> Assistant<C> {
    pub fn new(config: AssistantConfig, knowledge: KnowledgeBase, completer: C) -> Self {
        let protocol = Protocol::shared();
        let context =
            ContextManager::new(protocol.clone()).with_relevant_limit(config.relevant_limit);
        let memory = MemoryManager::new(protocol.clone());
        Self {
            config,
            protocol,
            context,
            memory,
            knowledge,
            completer,
            sources: Mutex::new(RecordedSources::default()),
        }
    }

    /// Shared store, for inspection or for pushing caller-defined context
    pub fn protocol(&self) -> SharedProtocol {
        self.protocol.clone()
    }

    pub fn context_manager(&self) -> &ContextManager {
        &self.context
    }

    pub fn memory_manager(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Latest chat turns, newest first, capped at `conversation_limit`
    pub async fn history(&self) -> Vec<ContextItem> {
        self.context
            .conversation_context(self.config.conversation_limit)
            .await
    }

    /// Store the knowledge base once, and the GitHub snapshot once per
    /// distinct snapshot. A changed snapshot replaces the stored content in place.
    async fn record_sources(&self, github: &GithubSnapshot) {
        let mut sources = self.sources.lock().await;

        if sources.rag.is_none() {
            let id = self.context.add_rag_context(self.knowledge.context()).await;
            sources.rag = Some(id);
        }

        let content = github.to_content();
        match &mut sources.github {
            Some((_, recorded)) if *recorded == content => {}
            Some((id, recorded)) => {
                self.protocol
                    .write()
                    .await
                    .update_context_item(id, ContextItemUpdate::new().content(content.clone()));
                *recorded = content;
                debug!("refreshed github context");
            }
            None => {
                let id = self.context.add_github_context(content.clone()).await;
                sources.github = Some((id, content));
            }
        }
    }

    /// Answer one user message.
    ///
    /// The prompt takes the subject's data from `github` and the knowledge
    /// search; the ranked buckets contribute conversation and caller-defined
    /// context.
    pub async fn respond(&self, message: &str, github: &GithubSnapshot) -> Result<Reply> {
        info!(len = message.len(), "handling chat turn");

        self.record_sources(github).await;
        self.context.add_user_message(message).await;
        self.context.update_relevance_scores(message).await;

        let knowledge = self.knowledge.search(message);
        let memories = self.memory.relevant_memories(message).await;
        let buckets = self.context.relevant_context_for_query(message).await;
        debug!(
            knowledge_found = knowledge.found,
            memories = memories.len(),
            "gathered turn context"
        );

        let system_prompt = PromptBuilder::new(&self.config.subject_name)
            .with_knowledge(&knowledge)
            .with_github(github)
            .with_buckets(&buckets)
            .with_memories(&memories)
            .build();

        let text = self.completer.complete(&system_prompt, message).await?;
        self.context.add_assistant_message(text.clone()).await;

        if message.to_lowercase().contains(PROJECT_KEYWORD) {
            self.memory
                .add_important_fact(format!("User asked about projects: {message}"))
                .await;
        }
        self.memory
            .forget_old_memories(self.config.forget_after_days)
            .await;

        let html = render::to_html(&text);
        Ok(Reply { text, html })
    }
}
