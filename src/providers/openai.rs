use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::providers::chat::{Auth, ChatCompletionRequest, ChatHttpClient};
use crate::providers::{ChatMessage, Provider, ProviderResult, TranslationRequest};

/// Default public API endpoint
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions client
#[derive(Debug)]
pub struct OpenAiProvider {
    /// Shared transport carrying auth, retries and pacing
    http: ChatHttpClient,
    /// API endpoint URL
    endpoint: String,
    /// Model name
    model: String,
    /// Sampling temperature
    temperature: f32,
    /// Nucleus sampling probability
    top_p: Option<f32>,
}

impl OpenAiProvider {
    /// Create a new client. An empty endpoint falls back to the public API.
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let endpoint = endpoint.into();
        let endpoint = if endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };

        Self {
            http: ChatHttpClient::new(Auth::Bearer(api_key.into())),
            endpoint,
            model: model.into(),
            temperature: 0.3,
            top_p: None,
        }
    }

    /// Set the retry policy
    pub fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.http = self.http.with_retries(max_retries, backoff_base_ms);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the nucleus sampling probability
    pub fn with_top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    /// Limit the request rate, in requests per minute (0 disables)
    pub fn with_rate_limit(mut self, requests_per_minute: u32) -> Self {
        self.http = self.http.with_rate_limit(requests_per_minute);
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    fn build_request(&self, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            top_p: self.top_p,
            max_tokens: None,
            stream: false,
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ProviderResult, ProviderError> {
        let request = self.build_request(messages);
        self.http.send(self.name(), &self.completions_url(), &request).await
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<ProviderResult, ProviderError> {
        self.chat(request.messages()).await
    }

    async fn validate_configuration(&self) -> Result<(), ProviderError> {
        if !self.http.has_credentials() {
            return Err(ProviderError::AuthenticationError(
                "API key is empty".to_string(),
            ));
        }

        let messages = vec![ChatMessage::user("Reply with OK.".to_string())];
        self.chat(messages).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_should_default_endpoint_when_empty() {
        let provider = OpenAiProvider::new("key", "", "gpt-4o-mini");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_new_should_trim_trailing_slash() {
        let provider = OpenAiProvider::new("key", "https://proxy.example.com/v1/", "m");
        assert_eq!(
            provider.completions_url(),
            "https://proxy.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_build_request_should_carry_sampling_parameters() {
        let provider = OpenAiProvider::new("key", "", "gpt-4o-mini")
            .with_temperature(0.7)
            .with_top_p(Some(0.9));
        let request = provider.build_request(vec![ChatMessage::user("hi")]);

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_p, Some(0.9));
    }

    #[tokio::test]
    async fn test_validate_configuration_should_reject_empty_key() {
        let provider = OpenAiProvider::new("", "", "gpt-4o-mini");
        let result = provider.validate_configuration().await;
        assert!(matches!(result, Err(ProviderError::AuthenticationError(_))));
    }
}
