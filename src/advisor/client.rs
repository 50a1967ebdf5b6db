//! Completion backend abstraction and the OpenRouter implementation.
//!
//! The pipeline only ever sees the `CompletionBackend` trait; the
//! HTTP details (and their failure modes) stay behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;

/// Failure taxonomy for the completion capability. Transport and
/// server failures are distinguishable from a successful-but-empty
/// reply, which arrives as `Ok("")`.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("no API key configured")]
    Unavailable,
}

/// Abstract `complete(prompt) -> text` capability consumed by the
/// advisor. Implemented over HTTP in production and by scripted mocks
/// in tests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Capability probe; unavailability means "skip the LLM stage".
    fn is_available(&self) -> bool;

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    content: String,
}

/// OpenRouter-backed completion client. The API key comes from the
/// `OPENROUTER_API_KEY` environment variable.
pub struct OpenRouterBackend {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenRouterBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: std::env::var("OPENROUTER_API_KEY").ok(),
        }
    }
}

impl Default for OpenRouterBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract a retry-after hint from a rate-limit response body.
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    for word in text_lower[pos..].split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>() {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

#[async_trait]
impl CompletionBackend for OpenRouterBackend {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::Unavailable)?;

        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature,
            stream: false,
        };

        let mut retry_count = 0;
        loop {
            let response = self
                .client
                .post(OPENROUTER_URL)
                .header("Content-Type", "application/json")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&request)
                .send()
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;

            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
                    LlmError::Server {
                        status: status.as_u16(),
                        body: format!("unparseable response: {}", e),
                    }
                })?;
                return Ok(parsed
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default());
            }

            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let backoff_secs = parse_retry_after(&text).unwrap_or(
                    (INITIAL_BACKOFF_MS * BACKOFF_MULTIPLIER.pow(retry_count - 1)) / 1000,
                );
                eprintln!(
                    "  Rate limited. Retrying in {}s (attempt {}/{})",
                    backoff_secs, retry_count, MAX_RETRIES
                );
                tokio::time::sleep(tokio::time::Duration::from_secs(backoff_secs)).await;
                continue;
            }

            return Err(LlmError::Server {
                status: status.as_u16(),
                body: truncate_str(&text, 200).to_string(),
            });
        }
    }
}

/// Truncate a string for display (Unicode-safe).
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        s
    } else {
        let byte_idx = s
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        &s[..byte_idx]
    }
}
