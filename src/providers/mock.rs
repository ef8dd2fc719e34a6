/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockProvider::working()` - Always succeeds with translated text
 * - `MockProvider::fail_first(n)` - Fails the first n requests, then succeeds
 * - `MockProvider::failing()` - Always fails with an error
 * - `MockProvider::slow(ms)` - Succeeds after a delay
 */

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{Provider, ProviderResult, TokenUsage, TranslationRequest};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a tagged translation
    Working,
    /// Fails the first n requests, then succeeds
    FailFirst(usize),
    /// Always fails with an error
    Failing,
    /// Simulates a slow backend (for pacing and cancellation testing)
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared across clones
    request_count: Arc<AtomicUsize>,
    /// Custom response generator (optional)
    custom_response: Option<fn(&TranslationRequest) -> String>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            custom_response: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock that fails the first n requests, then succeeds
    pub fn fail_first(n: usize) -> Self {
        Self::new(MockBehavior::FailFirst(n))
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a slow mock provider
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom response generator
    pub fn with_custom_response(mut self, generator: fn(&TranslationRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Total number of requests seen so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &TranslationRequest) -> ProviderResult {
        let text = if let Some(generator) = self.custom_response {
            generator(request)
        } else {
            format!("[{}] {}", request.target_language, request.text)
        };
        ProviderResult {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: request.text.len() as u64,
                completion_tokens: (request.text.len() / 2) as u64,
            }),
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
    ) -> Result<ProviderResult, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            MockBehavior::Working => Ok(self.respond(request)),

            MockBehavior::FailFirst(n) => {
                if count < n {
                    Err(ProviderError::ApiError {
                        status_code: 503,
                        message: format!("Simulated transient failure (request #{})", count + 1),
                    })
                } else {
                    Ok(self.respond(request))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated provider failure".to_string(),
            }),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(self.respond(request))
            }
        }
    }

    async fn validate_configuration(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
