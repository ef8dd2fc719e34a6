/*!
 * Shared chat-completion transport.
 *
 * Both HTTP backends speak the same wire format and need the same retry,
 * backoff and pacing behavior, so the request loop lives here once and each
 * backend supplies only its URL, request body and authentication scheme.
 */

use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{ChatMessage, ProviderResult, RateLimiter, TokenUsage};

/// Chat completion request body
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    /// The model to use
    pub model: String,
    /// The messages for the conversation
    pub messages: Vec<ChatMessage>,
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling probability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Whether to stream the response
    pub stream: bool,
}

/// One choice in a chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    /// Response message
    pub message: ChatMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Chat completion response body
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Generated choices
    pub choices: Vec<ChatCompletionChoice>,
    /// Token usage information
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Extract the completion text and usage from a parsed response body.
///
/// Some gateways return an error object with HTTP 200, so a missing or empty
/// choice list is treated as a parse failure, not an empty translation.
pub fn extract_completion(body: &str) -> Result<ProviderResult, ProviderError> {
    match serde_json::from_str::<ChatCompletionResponse>(body) {
        Ok(response) => match response.choices.into_iter().next() {
            Some(choice) => Ok(ProviderResult {
                text: choice.message.content,
                usage: response.usage,
            }),
            None => Err(parse_embedded_error(body)),
        },
        Err(_) => Err(parse_embedded_error(body)),
    }
}

/// Classify a body that did not parse as a completion. Error objects embedded
/// in a 200 response become ApiError, anything else is a parse failure.
fn parse_embedded_error(body: &str) -> ProviderError {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown API error")
                .to_string();
            return ProviderError::ApiError { status_code: 200, message };
        }
    }
    ProviderError::ParseError(format!(
        "Response is not a chat completion (first 200 chars): {}",
        body.chars().take(200).collect::<String>()
    ))
}

/// How a backend authenticates its requests
#[derive(Debug, Clone)]
pub enum Auth {
    /// `Authorization: Bearer <key>`
    Bearer(String),
    /// `api-key: <key>` header (Azure)
    ApiKey(String),
}

impl Auth {
    fn key(&self) -> &str {
        match self {
            Auth::Bearer(key) | Auth::ApiKey(key) => key,
        }
    }
}

/// HTTP transport with retry, exponential backoff and optional request
/// pacing, shared by every chat-completion backend.
#[derive(Debug)]
pub struct ChatHttpClient {
    /// HTTP client for API requests
    client: Client,
    /// Authentication scheme and credential
    auth: Auth,
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
    /// Optional request pacing
    rate_limiter: Option<RateLimiter>,
}

impl ChatHttpClient {
    /// Create a transport with the default timeouts and retry policy
    pub fn new(auth: Auth) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            auth,
            max_retries: 3,
            backoff_base_ms: 1000,
            rate_limiter: None,
        }
    }

    /// Set the retry policy
    pub fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Limit the request rate, in requests per minute (0 disables)
    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        if requests_per_minute > 0 {
            self.rate_limiter = Some(RateLimiter::per_minute(requests_per_minute));
        }
        self
    }

    /// Whether a non-empty credential is configured
    pub fn has_credentials(&self) -> bool {
        !self.auth.key().is_empty()
    }

    /// Send a chat request with retry and exponential backoff.
    ///
    /// Server errors and rate limits retry; authentication and other client
    /// errors fail immediately. `name` is the backend name, for logging.
    pub async fn send(
        &self,
        name: &str,
        url: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ProviderResult, ProviderError> {
        let mut attempt = 0;
        let mut last_error: Option<ProviderError> = None;

        while attempt <= self.max_retries {
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire().await;
            }

            let builder = self.client.post(url).json(request);
            let builder = match &self.auth {
                Auth::Bearer(key) => builder.bearer_auth(key),
                Auth::ApiKey(key) => builder.header("api-key", key),
            };

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.map_err(|e| {
                        ProviderError::RequestFailed(format!(
                            "Failed to read response body: {}",
                            e
                        ))
                    })?;

                    if status.is_success() {
                        match extract_completion(&body) {
                            Ok(result) => return Ok(result),
                            Err(e) => {
                                error!("{}: unusable response: {}", name, e);
                                last_error = Some(e);
                            }
                        }
                    } else if status.as_u16() == 429 {
                        warn!(
                            "{}: rate limited, attempt {}/{}",
                            name,
                            attempt + 1,
                            self.max_retries + 1
                        );
                        last_error = Some(ProviderError::RateLimitExceeded(body));
                    } else if status.as_u16() == 401 || status.as_u16() == 403 {
                        return Err(ProviderError::AuthenticationError(format!(
                            "API rejected credentials ({}): {}",
                            status, body
                        )));
                    } else if status.is_server_error() {
                        error!(
                            "{}: server error ({}), attempt {}/{}",
                            name,
                            status,
                            attempt + 1,
                            self.max_retries + 1
                        );
                        last_error = Some(ProviderError::ApiError {
                            status_code: status.as_u16(),
                            message: body,
                        });
                    } else {
                        return Err(ProviderError::ApiError {
                            status_code: status.as_u16(),
                            message: body,
                        });
                    }
                }
                Err(e) => {
                    error!(
                        "{}: network error: {}, attempt {}/{}",
                        name,
                        e,
                        attempt + 1,
                        self.max_retries + 1
                    );
                    last_error = Some(ProviderError::ConnectionError(e.to_string()));
                }
            }

            attempt += 1;
            if attempt <= self.max_retries {
                let backoff_ms = self.backoff_base_ms * (1u64 << (attempt - 1));
                debug!("{}: backing off {}ms", name, backoff_ms);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::RequestFailed(format!(
                "Request failed after {} attempts",
                self.max_retries + 1
            ))
        }))
    }
}
