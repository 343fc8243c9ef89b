//! Persona MCP - personal assistant chatbot
//!
//! Answers questions about one person by blending:
//! - A sectioned text knowledge base
//! - A GitHub profile snapshot
//! - Remembered facts and the running conversation
//!
//! The [`mcp`] module holds the in-process context and memory store that
//! ranks these sources before each prompt is assembled.

pub mod assistant;
pub mod github;
pub mod knowledge;
pub mod llm;
pub mod mcp;
pub mod prompt;
pub mod render;

pub use assistant::{Assistant, Reply};
pub use github::{GithubClient, GithubSnapshot, RepositorySummary};
pub use knowledge::{KnowledgeBase, KnowledgeMatch};
pub use llm::{ChatClient, Completer};
pub use mcp::{ContextManager, MemoryManager, Protocol, SharedProtocol};

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration for the assistant
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Person the assistant answers questions about
    pub subject_name: String,

    /// Path to the knowledge base text file
    pub knowledge_file: PathBuf,

    /// GitHub account to snapshot
    pub github_user: Option<String>,

    /// GitHub token (raises rate limits)
    pub github_token: Option<String>,

    /// OpenAI-compatible API root
    pub llm_base_url: String,

    pub llm_model: String,

    pub llm_api_key: Option<String>,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Ranked context items bucketed per turn
    pub relevant_limit: usize,

    /// Chat turns shown as recent conversation
    pub conversation_limit: usize,

    /// Memories older than this many days are forgotten unless important
    pub forget_after_days: i64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            subject_name: "the owner".to_string(),
            knowledge_file: PathBuf::from("info.txt"),
            github_user: None,
            github_token: None,
            llm_base_url: llm::DEFAULT_BASE_URL.to_string(),
            llm_model: llm::DEFAULT_MODEL.to_string(),
            llm_api_key: None,
            temperature: llm::DEFAULT_TEMPERATURE,
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            relevant_limit: mcp::DEFAULT_RELEVANT_LIMIT,
            conversation_limit: mcp::DEFAULT_CONVERSATION_LIMIT,
            forget_after_days: mcp::DEFAULT_FORGET_AFTER_DAYS,
        }
    }
}

impl AssistantConfig {
    /// Parse a TOML config; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.llm_base_url.trim().is_empty() {
            return Err(PersonaError::Config("llm_base_url must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PersonaError::Config(format!(
                "temperature {} outside 0.0..=2.0",
                self.temperature
            )));
        }
        if self.forget_after_days < 0 {
            return Err(PersonaError::Config(
                "forget_after_days must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// `~/.config/persona-mcp/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("persona-mcp").join("config.toml"))
    }

    /// Fill secrets and the GitHub user from `GROQ_API_KEY`, `GITHUB_TOKEN`
    /// and `GITHUB_USER` when set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.llm_api_key = Some(key);
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            self.github_token = Some(token);
        }
        if let Ok(user) = std::env::var("GITHUB_USER") {
            self.github_user = Some(user);
        }
        self
    }

    pub fn with_subject_name(mut self, name: impl Into<String>) -> Self {
        self.subject_name = name.into();
        self
    }

    pub fn with_knowledge_file(mut self, path: PathBuf) -> Self {
        self.knowledge_file = path;
        self
    }

    pub fn with_github_user(mut self, user: impl Into<String>) -> Self {
        self.github_user = Some(user.into());
        self
    }

    pub fn with_forget_after_days(mut self, days: i64) -> Self {
        self.forget_after_days = days;
        self
    }
}

/// Result type for assistant operations
pub type Result<T> = std::result::Result<T, PersonaError>;

/// Errors from the I/O-facing layers. The context store itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM request error: {0}")]
    Llm(String),

    /// Timeouts, connection failures and 5xx responses
    #[error("LLM request error (transient): {0}")]
    LlmTransient(String),

    #[error("GitHub request error: {0}")]
    Github(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AssistantConfig::default();
        assert_eq!(config.knowledge_file, PathBuf::from("info.txt"));
        assert_eq!(config.llm_model, "llama3-70b-8192");
        assert_eq!(config.relevant_limit, 5);
        assert_eq!(config.forget_after_days, 30);
        assert!(config.github_user.is_none());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = AssistantConfig::from_toml_str("").unwrap();
        assert_eq!(config.subject_name, AssistantConfig::default().subject_name);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AssistantConfig::from_toml_str("temperature = 3.5").unwrap_err();
        assert!(matches!(err, PersonaError::Config(_)));

        let err = AssistantConfig::from_toml_str("llm_base_url = \"  \"").unwrap_err();
        assert!(err.to_string().contains("llm_base_url"));

        let err = AssistantConfig::from_toml_str("forget_after_days = -1").unwrap_err();
        assert!(matches!(err, PersonaError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "subject_name = \"Dhurkesh\"\nmax_tokens = 512\n").unwrap();

        let config = AssistantConfig::load(&path).unwrap();
        assert_eq!(config.subject_name, "Dhurkesh");
        assert_eq!(config.max_tokens, 512);

        let missing = AssistantConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(PersonaError::Io(_))));
    }
}
