/*!
 * Core translation service.
 *
 * One `TranslationService` wraps a provider, an optional translation memory
 * and the run options. A unit of text is always resolved memory-first; only
 * a miss reaches the oracle, and oracle successes are written back so later
 * runs (and repeated segments within one run) reuse them.
 */

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::TranslationError;
use crate::language_utils;
use crate::memory::{MemoryEntry, TranslationMemory};
use crate::providers::{Provider, TokenUsage, TranslationRequest};

/// Options governing a translation run
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Source language tag
    pub source_language: String,
    /// Target language tag
    pub target_language: String,
    /// Token budget per oracle request
    pub max_tokens_per_request: usize,
    /// Retry attempts for failed units in the retry pass
    pub max_retries: u32,
    /// Fixed delay between retry attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Whether the oracle is told to keep inline markup and placeholders
    pub preserve_formatting: bool,
    /// Whether to consult and populate the translation memory
    pub use_memory: bool,
    /// Minimum similarity for fuzzy memory hits
    pub min_similarity: f64,
    /// Term substitutions the oracle must honor
    pub terminology: HashMap<String, String>,
    /// Cost per 1000 prompt tokens, for the run estimate
    pub prompt_cost_per_1k: f64,
    /// Cost per 1000 completion tokens, for the run estimate
    pub completion_cost_per_1k: f64,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            max_tokens_per_request: 1000,
            max_retries: 3,
            retry_delay_ms: 1000,
            preserve_formatting: true,
            use_memory: true,
            min_similarity: 0.8,
            terminology: HashMap::new(),
            prompt_cost_per_1k: 0.0,
            completion_cost_per_1k: 0.0,
        }
    }
}

impl TranslationOptions {
    /// Retry delay as a `Duration`
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Cost estimate for one reported token usage
    pub fn usage_cost(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 / 1000.0 * self.prompt_cost_per_1k
            + usage.completion_tokens as f64 / 1000.0 * self.completion_cost_per_1k
    }
}

/// Oracle metrics recorded for one translated unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitMetrics {
    /// Chapter index of the source paragraph
    pub chapter_index: usize,
    /// Paragraph index within its chapter
    pub paragraph_index: usize,
    /// Part number within a split paragraph
    pub part: usize,
    /// Token usage reported by the backend
    pub usage: TokenUsage,
    /// Wall-clock time of the oracle call, in milliseconds
    pub latency_ms: u64,
    /// Cost estimate for this unit alone
    pub estimated_cost: f64,
}

/// Aggregated metrics for a translation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationMetrics {
    /// Estimated tokens in the source text
    pub source_tokens: usize,
    /// Prompt tokens reported by the backend
    pub prompt_tokens: u64,
    /// Completion tokens reported by the backend
    pub completion_tokens: u64,
    /// Units resolved from the translation memory
    pub memory_hits: usize,
    /// Units resolved by the oracle
    pub oracle_calls: usize,
    /// Retry attempts made during the retry pass
    pub retry_count: usize,
    /// Paragraphs that fell back to their original text
    pub fallback_count: usize,
    /// Wall-clock duration of the run, in milliseconds
    pub duration_ms: u64,
    /// Cost estimate derived from reported token usage
    pub estimated_cost: f64,
    /// Per-unit oracle breakdown, in completion order
    pub units: Vec<UnitMetrics>,
}

impl TranslationMetrics {
    /// Fold reported token usage into the totals
    pub fn record_usage(&mut self, usage: &TokenUsage, options: &TranslationOptions) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.estimated_cost += options.usage_cost(usage);
    }

    /// Record one oracle-resolved unit: the usage folds into the totals and
    /// the per-unit breakdown keeps the individual record.
    pub fn record_unit(
        &mut self,
        chapter_index: usize,
        paragraph_index: usize,
        part: usize,
        usage: TokenUsage,
        latency_ms: u64,
        options: &TranslationOptions,
    ) {
        self.record_usage(&usage, options);
        self.units.push(UnitMetrics {
            chapter_index,
            paragraph_index,
            part,
            usage,
            latency_ms,
            estimated_cost: options.usage_cost(&usage),
        });
    }

    /// Merge another metrics bundle into this one
    pub fn merge(&mut self, other: &TranslationMetrics) {
        self.source_tokens += other.source_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.memory_hits += other.memory_hits;
        self.oracle_calls += other.oracle_calls;
        self.retry_count += other.retry_count;
        self.fallback_count += other.fallback_count;
        self.duration_ms += other.duration_ms;
        self.estimated_cost += other.estimated_cost;
        self.units.extend(other.units.iter().cloned());
    }
}

/// How a unit of text was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Served from the translation memory
    MemoryHit,
    /// Translated by the oracle
    Oracle,
}

/// Translation service bundling a provider, an optional memory and options
#[derive(Clone)]
pub struct TranslationService {
    provider: Arc<dyn Provider>,
    memory: Option<TranslationMemory>,
    /// Run options
    pub options: TranslationOptions,
}

impl TranslationService {
    /// Create a new service
    pub fn new(
        provider: Arc<dyn Provider>,
        memory: Option<TranslationMemory>,
        options: TranslationOptions,
    ) -> Self {
        Self { provider, memory, options }
    }

    /// The backend name, for logging
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build the system prompt carrying the translation instructions.
    ///
    /// The oracle must return only the translated text, keeping inline markup
    /// and placeholders untouched, so the output can be substituted back into
    /// the chapter tree verbatim.
    pub fn build_system_prompt(&self) -> String {
        let source = language_utils::display_name(&self.options.source_language);
        let target = language_utils::display_name(&self.options.target_language);

        let mut prompt = format!(
            "You are a professional literary translator. Translate the user's text \
             from {} to {}. Preserve the tone and register of the original.",
            source, target
        );
        if self.options.preserve_formatting {
            prompt.push_str(
                " Keep any inline markup, entities and placeholders exactly as they appear.",
            );
        }
        prompt.push_str(" Respond with the translated text only, no commentary.");

        if !self.options.terminology.is_empty() {
            let mut terms: Vec<_> = self.options.terminology.iter().collect();
            terms.sort();
            prompt.push_str("\n\nUse these exact term translations:");
            for (term, rendering) in terms {
                prompt.push_str(&format!("\n- {} => {}", term, rendering));
            }
        }

        prompt
    }

    fn build_request(&self, text: &str) -> TranslationRequest {
        TranslationRequest {
            system_prompt: self.build_system_prompt(),
            text: text.to_string(),
            source_language: self.options.source_language.clone(),
            target_language: self.options.target_language.clone(),
        }
    }

    /// Translate one unit of text, memory-first.
    ///
    /// Memory failures degrade to a cache miss; only provider failures
    /// surface as errors.
    pub async fn translate_text(
        &self,
        text: &str,
    ) -> Result<(String, Option<TokenUsage>, UnitOutcome), TranslationError> {
        if let Some(hit) = self.lookup_memory(text).await {
            return Ok((hit, None, UnitOutcome::MemoryHit));
        }

        let request = self.build_request(text);
        let result = self.provider.translate(&request).await?;

        self.store_memory(text, &result.text).await;

        Ok((result.text, result.usage, UnitOutcome::Oracle))
    }

    async fn lookup_memory(&self, text: &str) -> Option<String> {
        if !self.options.use_memory {
            return None;
        }
        let memory = self.memory.as_ref()?;

        match memory
            .find_match(
                text,
                &self.options.source_language,
                &self.options.target_language,
                self.options.min_similarity,
            )
            .await
        {
            Ok(Some(entry)) => {
                debug!("Translation memory hit ({} chars)", text.chars().count());
                Some(entry.translated_text)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Translation memory lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn store_memory(&self, source: &str, translated: &str) {
        if !self.options.use_memory {
            return;
        }
        let Some(memory) = self.memory.as_ref() else {
            return;
        };

        let entry = MemoryEntry::new(
            source,
            translated,
            &self.options.source_language,
            &self.options.target_language,
        );
        if let Err(e) = memory.store(&entry).await {
            warn!("Failed to store translation memory entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    fn service_with(provider: MockProvider, memory: Option<TranslationMemory>) -> TranslationService {
        TranslationService::new(Arc::new(provider), memory, TranslationOptions::default())
    }

    #[test]
    fn test_build_system_prompt_should_name_both_languages() {
        let service = service_with(MockProvider::working(), None);
        let prompt = service.build_system_prompt();
        assert!(prompt.contains("English"));
        assert!(prompt.contains("Chinese"));
    }

    #[test]
    fn test_build_system_prompt_should_honor_formatting_flag() {
        let mut options = TranslationOptions::default();
        options.preserve_formatting = false;
        let service =
            TranslationService::new(Arc::new(MockProvider::working()), None, options);

        assert!(!service.build_system_prompt().contains("inline markup"));
    }

    #[test]
    fn test_build_system_prompt_should_list_terminology() {
        let mut options = TranslationOptions::default();
        options.terminology.insert("the Shire".to_string(), "夏尔".to_string());
        let service = TranslationService::new(
            Arc::new(MockProvider::working()),
            None,
            options,
        );

        let prompt = service.build_system_prompt();
        assert!(prompt.contains("the Shire => 夏尔"));
    }

    #[tokio::test]
    async fn test_translate_text_should_call_oracle_on_miss() {
        let service = service_with(MockProvider::working(), None);

        let (text, usage, outcome) = service.translate_text("Hello world.").await.unwrap();
        assert_eq!(text, "[zh] Hello world.");
        assert!(usage.is_some());
        assert_eq!(outcome, UnitOutcome::Oracle);
    }

    #[tokio::test]
    async fn test_translate_text_should_prefer_memory_hit() {
        let provider = MockProvider::working();
        let counter = provider.clone();
        let memory = TranslationMemory::new_in_memory().unwrap();
        let service = service_with(provider, Some(memory));

        service.translate_text("Hello world.").await.unwrap();
        assert_eq!(counter.call_count(), 1);

        let (_, usage, outcome) = service.translate_text("Hello world.").await.unwrap();
        assert_eq!(counter.call_count(), 1, "second call must not reach the oracle");
        assert!(usage.is_none());
        assert_eq!(outcome, UnitOutcome::MemoryHit);
    }

    #[tokio::test]
    async fn test_translate_text_should_skip_memory_when_disabled() {
        let provider = MockProvider::working();
        let counter = provider.clone();
        let memory = TranslationMemory::new_in_memory().unwrap();
        let mut options = TranslationOptions::default();
        options.use_memory = false;
        let service =
            TranslationService::new(Arc::new(provider), Some(memory), options);

        service.translate_text("Hello world.").await.unwrap();
        service.translate_text("Hello world.").await.unwrap();
        assert_eq!(counter.call_count(), 2);
    }

    #[tokio::test]
    async fn test_translate_text_should_surface_provider_error() {
        let service = service_with(MockProvider::failing(), None);
        let result = service.translate_text("Hello world.").await;
        assert!(matches!(result, Err(TranslationError::Provider(_))));
    }

    #[test]
    fn test_metrics_record_usage_should_accumulate_cost() {
        let mut options = TranslationOptions::default();
        options.prompt_cost_per_1k = 1.0;
        options.completion_cost_per_1k = 2.0;

        let mut metrics = TranslationMetrics::default();
        metrics.record_usage(
            &TokenUsage { prompt_tokens: 500, completion_tokens: 250 },
            &options,
        );

        assert_eq!(metrics.prompt_tokens, 500);
        assert_eq!(metrics.completion_tokens, 250);
        assert!((metrics.estimated_cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_record_unit_should_keep_totals_in_sync() {
        let mut options = TranslationOptions::default();
        options.prompt_cost_per_1k = 1.0;
        options.completion_cost_per_1k = 2.0;

        let mut metrics = TranslationMetrics::default();
        metrics.record_unit(
            0,
            3,
            0,
            TokenUsage { prompt_tokens: 100, completion_tokens: 50 },
            42,
            &options,
        );
        metrics.record_unit(
            1,
            0,
            2,
            TokenUsage { prompt_tokens: 10, completion_tokens: 5 },
            7,
            &options,
        );

        assert_eq!(metrics.units.len(), 2);
        assert_eq!(metrics.units[0].paragraph_index, 3);
        assert_eq!(metrics.units[0].latency_ms, 42);
        assert_eq!(metrics.units[1].chapter_index, 1);
        assert_eq!(metrics.prompt_tokens, 110);
        assert_eq!(metrics.completion_tokens, 55);
        let breakdown_cost: f64 = metrics.units.iter().map(|u| u.estimated_cost).sum();
        assert!((metrics.estimated_cost - breakdown_cost).abs() < 1e-9);
    }
}
