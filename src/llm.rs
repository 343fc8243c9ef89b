//! Chat completion client
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. The default
//! provider is Groq. Transient failures (timeouts, connection errors, 5xx)
//! are retried with exponential backoff.

use crate::{PersonaError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Groq's OpenAI-compatible API root
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

const MAX_RETRY_ATTEMPTS: u32 = 4;
const RETRY_BASE_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that turns a system prompt and a user prompt into a reply
pub trait Completer: Send + Sync {
    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

// ─── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ─── Client ─────────────────────────────────────────────────────────

/// Chat Completions client
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(15))
            .user_agent(concat!("persona-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PersonaError::Llm(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Build a client from the LLM settings of `config`
    pub fn from_config(config: &crate::AssistantConfig) -> Result<Self> {
        Ok(Self::new(config.llm_base_url.clone(), config.llm_api_key.clone())?
            .with_model(config.llm_model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, system_prompt: &str, user_prompt: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        }
    }

    async fn send_request(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self.build_request(system_prompt, user_prompt);

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| PersonaError::Llm(e.to_string()))?;

        Ok(chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }

    fn retry_backoff(attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(exp))
    }

    fn is_retryable(err: &PersonaError) -> bool {
        matches!(err, PersonaError::LlmTransient(_))
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::status_error(status, &body))
    }

    /// Server errors are transient, everything else is final
    fn status_error(status: StatusCode, body: &str) -> PersonaError {
        let detail = Self::extract_error_detail(body);
        let msg = if detail.is_empty() {
            format!("API error {status}")
        } else {
            format!("API error {status}: {detail}")
        };
        if status.is_server_error() {
            PersonaError::LlmTransient(msg)
        } else {
            PersonaError::Llm(msg)
        }
    }

    /// Pull `error.message` or `message` out of a JSON error body
    fn extract_error_detail(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
            if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
        }
        trimmed.chars().take(500).collect()
    }

    fn map_reqwest_error(e: reqwest::Error) -> PersonaError {
        if e.is_timeout() {
            PersonaError::LlmTransient(format!("timeout: {e}"))
        } else if e.is_connect() {
            PersonaError::LlmTransient(format!("network: {e}"))
        } else {
            PersonaError::Llm(e.to_string())
        }
    }
}

impl Completer for ChatClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        debug!(
            model = %self.model,
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            "calling chat completion"
        );

        with_retry(|| self.send_request(system_prompt, user_prompt)).await
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// [`MAX_RETRY_ATTEMPTS`] is reached
async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if ChatClient::is_retryable(&e) && attempt + 1 < MAX_RETRY_ATTEMPTS => {
                attempt += 1;
                let delay = ChatClient::retry_backoff(attempt);
                warn!(
                    "LLM request failed (attempt {}/{}), retrying in {:?}: {}",
                    attempt, MAX_RETRY_ATTEMPTS, delay, e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let client = ChatClient::new(DEFAULT_BASE_URL, None).unwrap();
        let request = client.build_request("sys", "hello");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], json!(DEFAULT_MODEL));
        assert_eq!(value["messages"][0]["role"], json!("system"));
        assert_eq!(value["messages"][1]["content"], json!("hello"));
        assert_eq!(value["max_tokens"], json!(1024));
        assert_eq!(value["stream"], json!(false));
    }

    #[test]
    fn test_extract_error_detail() {
        assert_eq!(
            ChatClient::extract_error_detail(r#"{"error": {"message": "bad key"}}"#),
            "bad key"
        );
        assert_eq!(
            ChatClient::extract_error_detail(r#"{"message": "slow down"}"#),
            "slow down"
        );
        assert_eq!(ChatClient::extract_error_detail("  plain text "), "plain text");
        assert_eq!(ChatClient::extract_error_detail(""), "");
    }

    #[test]
    fn test_retry_classification() {
        let server = ChatClient::status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(ChatClient::is_retryable(&server));
        assert!(ChatClient::is_retryable(&PersonaError::LlmTransient(
            "timeout: deadline".to_string()
        )));

        let unauthorized =
            ChatClient::status_error(StatusCode::UNAUTHORIZED, r#"{"message": "bad key"}"#);
        assert_eq!(
            unauthorized.to_string(),
            "LLM request error: API error 401 Unauthorized: bad key"
        );
        assert!(!ChatClient::is_retryable(&unauthorized));
        assert!(ChatClient::retry_backoff(3) > ChatClient::retry_backoff(1));
    }

    #[test]
    fn test_client_errors_mentioning_transport_words_are_final() {
        let bad_request = ChatClient::status_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "request timeout parameter must be positive"}}"#,
        );
        assert!(bad_request.to_string().contains("timeout"));
        assert!(!ChatClient::is_retryable(&bad_request));

        let unauthorized =
            ChatClient::status_error(StatusCode::UNAUTHORIZED, "invalid connection key");
        assert!(!ChatClient::is_retryable(&unauthorized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let attempts = std::cell::Cell::new(0u32);
        let result: Result<String> = with_retry(|| {
            attempts.set(attempts.get() + 1);
            async {
                Err(ChatClient::status_error(
                    StatusCode::BAD_REQUEST,
                    r#"{"error": {"message": "network timeout value invalid"}}"#,
                ))
            }
        })
        .await;

        assert!(matches!(result, Err(PersonaError::Llm(_))));
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_retry_until_exhausted() {
        let attempts = std::cell::Cell::new(0u32);
        let result: Result<String> = with_retry(|| {
            attempts.set(attempts.get() + 1);
            async { Err(ChatClient::status_error(StatusCode::BAD_GATEWAY, "")) }
        })
        .await;

        assert!(matches!(result, Err(PersonaError::LlmTransient(_))));
        assert_eq!(attempts.get(), MAX_RETRY_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_then_success() {
        let attempts = std::cell::Cell::new(0u32);
        let result = with_retry(|| {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n < 3 {
                    Err(PersonaError::LlmTransient("network: refused".to_string()))
                } else {
                    Ok("hi".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "hi");
        assert_eq!(attempts.get(), 3);
    }
}
