//! System prompt assembly for assistant turns

use crate::github::GithubSnapshot;
use crate::knowledge::KnowledgeMatch;
use crate::mcp::{Content, ContextBuckets, MemoryItem};

/// Characters of README text shown per repository
const README_PREVIEW_CHARS: usize = 200;

/// Builds the system prompt from the pieces gathered for one turn
pub struct PromptBuilder<'a> {
    subject: &'a str,
    knowledge: Option<&'a KnowledgeMatch>,
    github: Option<&'a GithubSnapshot>,
    buckets: Option<&'a ContextBuckets>,
    memories: &'a [MemoryItem],
}

impl<'a> PromptBuilder<'a> {
    /// `subject` is the person the assistant answers questions about
    pub fn new(subject: &'a str) -> Self {
        Self {
            subject,
            knowledge: None,
            github: None,
            buckets: None,
            memories: &[],
        }
    }

    pub fn with_knowledge(mut self, knowledge: &'a KnowledgeMatch) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_github(mut self, github: &'a GithubSnapshot) -> Self {
        self.github = Some(github);
        self
    }

    /// Ranked context. The github and rag buckets stand in for the live
    /// snapshot and knowledge search when those were not supplied.
    pub fn with_buckets(mut self, buckets: &'a ContextBuckets) -> Self {
        self.buckets = Some(buckets);
        self
    }

    pub fn with_memories(mut self, memories: &'a [MemoryItem]) -> Self {
        self.memories = memories;
        self
    }

    fn repository_info(github: &GithubSnapshot) -> String {
        let mut info = String::new();
        for repo in &github.repositories {
            info.push_str(&format!("\nRepository: {}\n", repo.name));
            info.push_str(&format!("Description: {}\n", repo.description));
            info.push_str(&format!("Language: {}\n", repo.language));
            if !repo.readme.is_empty() {
                let preview: String = repo.readme.chars().take(README_PREVIEW_CHARS).collect();
                info.push_str(&format!("README Preview: {}...\n", preview));
            }
            info.push_str("---\n");
        }
        info
    }

    fn content_line(content: &Content) -> String {
        match content {
            Content::Text(text) => text.clone(),
            Content::Map(map) => serde_json::Value::Object(map.clone()).to_string(),
            Content::Other(value) => value.to_string(),
        }
    }

    /// Render the system prompt
    pub fn build(&self) -> String {
        let subject = self.subject;
        let mut prompt = format!(
            "Hi! I'm {subject}'s personal assistant. I have access to their information \
             and can help answer questions about them.\n\n"
        );

        let knowledge = self
            .knowledge
            .map(|k| k.content.as_str())
            .unwrap_or(crate::knowledge::NO_MATCH);
        prompt.push_str(&format!("Here's what I know about {subject}:\n{knowledge}\n\n"));

        if let Some(github) = self.github {
            prompt.push_str(&format!(
                "Repository Information:\n{}\n",
                Self::repository_info(github)
            ));
            prompt.push_str(&format!(
                "Recent Activity:\n{}\n\n",
                github.recent_activity.join(", ")
            ));
        }

        if !self.memories.is_empty() {
            prompt.push_str("Things I remember:\n");
            for memory in self.memories {
                prompt.push_str(&format!("- {}\n", Self::content_line(memory.content())));
            }
            prompt.push('\n');
        }

        if let Some(buckets) = self.buckets {
            if self.knowledge.is_none() && !buckets.rag.is_empty() {
                prompt.push_str("Background notes:\n");
                for notes in &buckets.rag {
                    prompt.push_str(&format!("{}\n", Self::content_line(notes)));
                }
                prompt.push('\n');
            }
            if self.github.is_none() && !buckets.github.is_empty() {
                prompt.push_str("GitHub context:\n");
                for snapshot in &buckets.github {
                    prompt.push_str(&format!("- {}\n", Self::content_line(snapshot)));
                }
                prompt.push('\n');
            }
            if !buckets.conversation.is_empty() {
                prompt.push_str("Relevant conversation:\n");
                for turn in &buckets.conversation {
                    prompt.push_str(&format!("- {}\n", Self::content_line(turn)));
                }
                prompt.push('\n');
            }
            if !buckets.other.is_empty() {
                prompt.push_str("Additional context:\n");
                for item in &buckets.other {
                    prompt.push_str(&format!("- {}\n", Self::content_line(item)));
                }
                prompt.push('\n');
            }
        }

        prompt.push_str(&format!(
            "I can help you with:\n\
             - Information about {subject}'s background and experience\n\
             - Details about their projects and work\n\
             - Any other questions you might have about them\n\n\
             Please feel free to ask your question, and I'll provide a helpful response \
             based on the available information."
        ));
        prompt
    }
}
