/*!
 * Provider implementations for translation backends.
 *
 * This module contains client implementations for chat-completion APIs:
 * - OpenAI: the public chat completions endpoint
 * - Azure: Azure-hosted OpenAI deployments
 * - Mock: configurable in-process provider for testing
 *
 * The HTTP backends share one transport (`chat::ChatHttpClient`) carrying
 * the retry, backoff and pacing behavior.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use crate::errors::ProviderError;

pub mod azure;
pub mod chat;
pub mod mock;
pub mod openai;

/// A single chat message sent to or received from a backend
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// A translation request: instructions plus the text to translate
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    /// System prompt carrying the translation instructions
    pub system_prompt: String,
    /// The text to translate
    pub text: String,
    /// Source language tag
    pub source_language: String,
    /// Target language tag
    pub target_language: String,
}

impl TranslationRequest {
    /// Flatten into the chat message sequence backends expect
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.text.clone()),
        ]
    }
}

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
pub struct TokenUsage {
    /// Number of prompt tokens
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Number of completion tokens
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Result of a completed translation request
#[derive(Debug, Clone)]
pub struct ProviderResult {
    /// The translated text
    pub text: String,
    /// Token usage, when the backend reports it
    pub usage: Option<TokenUsage>,
}

/// Common trait for translation backends.
///
/// Implementations are interchangeable behind `Arc<dyn Provider>`, which is
/// how the orchestrator holds them.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Human-readable backend name for logging
    fn name(&self) -> &str;

    /// Translate the request text, returning the translated output
    async fn translate(&self, request: &TranslationRequest)
        -> Result<ProviderResult, ProviderError>;

    /// Verify the backend is reachable and the credentials work
    async fn validate_configuration(&self) -> Result<(), ProviderError>;
}

/// Minimum-interval rate limiter shared by a backend's requests.
///
/// Each call to `acquire` waits until at least the configured interval has
/// elapsed since the previous acquisition, serializing the pacing decision
/// behind an async mutex so concurrent workers line up fairly.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `requests_per_minute` requests
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let interval_ms = if requests_per_minute == 0 {
            0
        } else {
            60_000 / u64::from(requests_per_minute)
        };
        Self {
            min_interval: Duration::from_millis(interval_ms),
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait for the next request slot
    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
