//! GitHub profile snapshot
//!
//! Fetches public repositories, their READMEs and recent event types for one
//! user. Failed list calls degrade to empty lists so a chat turn never fails
//! on GitHub availability.

use crate::mcp::Content;
use crate::{PersonaError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Public GitHub REST API root
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Number of recent event types kept in a snapshot
const RECENT_EVENTS: usize = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One repository as presented to the assistant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Profile data pushed into the context store once per turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GithubSnapshot {
    pub username: String,
    #[serde(default)]
    pub repositories: Vec<RepositorySummary>,
    /// Event type names, newest first
    #[serde(default)]
    pub recent_activity: Vec<String>,
}

impl GithubSnapshot {
    pub fn empty(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    /// Mapping form stored as github context
    pub fn to_content(&self) -> Content {
        Content::from(serde_json::json!({
            "username": self.username,
            "repositories": self.repositories,
            "recent_activity": self.recent_activity,
        }))
    }
}

impl From<&GithubSnapshot> for Content {
    fn from(snapshot: &GithubSnapshot) -> Self {
        snapshot.to_content()
    }
}

// ─── REST payloads ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RepoPayload {
    name: String,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(rename = "type")]
    event_type: String,
}

// ─── Client ─────────────────────────────────────────────────────────

/// Minimal GitHub REST client
pub struct GithubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("persona-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PersonaError::Github(e.to_string()))?;
        Ok(Self {
            client,
            base_url: GITHUB_API_URL.to_string(),
            token,
        })
    }

    /// Point the client at another API root (GitHub Enterprise, test servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Repositories, READMEs and the most recent event types for `username`
    pub async fn snapshot(&self, username: &str) -> GithubSnapshot {
        let repos = match self.repositories(username).await {
            Ok(repos) => repos,
            Err(e) => {
                warn!("Failed to list repositories for {}: {}", username, e);
                Vec::new()
            }
        };

        let mut repositories = Vec::with_capacity(repos.len());
        for repo in repos {
            let readme = self.readme(username, &repo.name).await;
            repositories.push(RepositorySummary {
                name: repo.name,
                description: repo.description.unwrap_or_default(),
                language: repo.language.unwrap_or_default(),
                stars: repo.stargazers_count,
                forks: repo.forks_count,
                readme,
                url: repo.html_url,
                created_at: repo.created_at,
                updated_at: repo.updated_at,
            });
        }

        let recent_activity = match self.recent_events(username).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to list events for {}: {}", username, e);
                Vec::new()
            }
        };

        debug!(
            username,
            repositories = repositories.len(),
            events = recent_activity.len(),
            "fetched github snapshot"
        );
        GithubSnapshot {
            username: username.to_string(),
            repositories,
            recent_activity,
        }
    }

    async fn repositories(&self, username: &str) -> Result<Vec<RepoPayload>> {
        let response = self
            .get(&format!("users/{username}/repos"))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| PersonaError::Github(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PersonaError::Github(format!(
                "repository listing returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PersonaError::Github(e.to_string()))
    }

    /// Raw README text, empty when the repository has none
    async fn readme(&self, username: &str, repo: &str) -> String {
        let response = self
            .get(&format!("repos/{username}/{repo}/readme"))
            .header("Accept", "application/vnd.github.raw")
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => {
                response.text().await.unwrap_or_default()
            }
            Ok(response) => {
                debug!(repo, status = %response.status(), "no readme");
                String::new()
            }
            Err(e) => {
                debug!(repo, "readme request failed: {}", e);
                String::new()
            }
        }
    }

    async fn recent_events(&self, username: &str) -> Result<Vec<String>> {
        let response = self
            .get(&format!("users/{username}/events"))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| PersonaError::Github(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PersonaError::Github(format!(
                "event listing returned {}",
                response.status()
            )));
        }
        let events: Vec<EventPayload> = response
            .json()
            .await
            .map_err(|e| PersonaError::Github(e.to_string()))?;
        Ok(events
            .into_iter()
            .take(RECENT_EVENTS)
            .map(|e| e.event_type)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_to_content_is_mapping() {
        let snapshot = GithubSnapshot {
            username: "dhurkesh".to_string(),
            repositories: vec![RepositorySummary {
                name: "portfolio".to_string(),
                language: "Rust".to_string(),
                ..Default::default()
            }],
            recent_activity: vec!["PushEvent".to_string()],
        };

        let content = snapshot.to_content();
        let map = content.as_map().unwrap();
        assert_eq!(map["username"], json!("dhurkesh"));
        assert_eq!(map["repositories"][0]["language"], json!("Rust"));
        assert_eq!(map["recent_activity"], json!(["PushEvent"]));
    }

    #[test]
    fn test_repo_payload_tolerates_nulls() {
        let payload: RepoPayload = serde_json::from_value(json!({
            "name": "x",
            "description": null,
            "language": null,
            "stargazers_count": 3
        }))
        .unwrap();
        assert_eq!(payload.name, "x");
        assert!(payload.description.is_none());
        assert_eq!(payload.stargazers_count, 3);
    }
}
