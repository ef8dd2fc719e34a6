use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::providers::chat::{Auth, ChatCompletionRequest, ChatHttpClient};
use crate::providers::{ChatMessage, Provider, ProviderResult, TranslationRequest};

/// Default API version for Azure-hosted deployments
const DEFAULT_API_VERSION: &str = "2024-02-01";

/// Azure-hosted OpenAI chat completions client.
///
/// Same wire format as the public API but addressed by deployment name, with
/// the key in an `api-key` header and the API version as a query parameter.
#[derive(Debug)]
pub struct AzureProvider {
    /// Shared transport carrying auth, retries and pacing
    http: ChatHttpClient,
    /// Resource endpoint, e.g. `https://myresource.openai.azure.com`
    endpoint: String,
    /// Deployment name standing in for the model
    deployment: String,
    /// API version query parameter
    api_version: String,
    /// Sampling temperature
    temperature: f32,
    /// Nucleus sampling probability
    top_p: Option<f32>,
}

impl AzureProvider {
    /// Create a new client for the given resource and deployment
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            http: ChatHttpClient::new(Auth::ApiKey(api_key.into())),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            temperature: 0.3,
            top_p: None,
        }
    }

    /// Override the API version
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
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
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ProviderResult, ProviderError> {
        let request = ChatCompletionRequest {
            // Azure routes by deployment; the body model field is ignored
            model: self.deployment.clone(),
            messages,
            temperature: Some(self.temperature),
            top_p: self.top_p,
            max_tokens: None,
            stream: false,
        };
        self.http.send(self.name(), &self.completions_url(), &request).await
    }
}

#[async_trait]
impl Provider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
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
        if self.endpoint.is_empty() || self.deployment.is_empty() {
            return Err(ProviderError::RequestFailed(
                "Endpoint and deployment are required".to_string(),
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
    fn test_completions_url_should_address_deployment() {
        let provider = AzureProvider::new("key", "https://res.openai.azure.com/", "gpt4o");
        assert_eq!(
            provider.completions_url(),
            "https://res.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_with_api_version_should_override_query() {
        let provider = AzureProvider::new("key", "https://res.openai.azure.com", "gpt4o")
            .with_api_version("2024-06-01");
        assert!(provider.completions_url().ends_with("api-version=2024-06-01"));
    }

    #[tokio::test]
    async fn test_validate_configuration_should_reject_missing_deployment() {
        let provider = AzureProvider::new("key", "https://res.openai.azure.com", "");
        let result = provider.validate_configuration().await;
        assert!(matches!(result, Err(ProviderError::RequestFailed(_))));
    }
}
