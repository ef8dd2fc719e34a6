/*!
 * Book-level translation orchestration.
 *
 * Chapters are batched, batches are classified into concurrency tiers and
 * dispatched over a bounded `buffer_unordered` stream. Unit failures are
 * captured without aborting the run; a bounded retry pass follows, and units
 * whose retries are exhausted fall back to their original text, so the book
 * is always fully populated when the run completes.
 */

use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::book::model::Book;
use crate::chunking::{batch_paragraphs, estimate_tokens, Batch, BatchUnit};
use crate::errors::TranslationError;
use crate::providers::TokenUsage;
use crate::translation::core::{TranslationMetrics, TranslationService, UnitOutcome};
use crate::translation::{CancelFlag, TierLimiter};

/// One batch scheduled for translation
struct WorkItem {
    chapter_index: usize,
    tier: usize,
    batch: Batch,
}

/// Outcome of translating one unit
struct UnitResult {
    unit: BatchUnit,
    outcome: Result<(String, Option<TokenUsage>, UnitOutcome), TranslationError>,
    latency_ms: u64,
}

/// A unit left untranslated after the first pass
struct FailedUnit {
    chapter_index: usize,
    unit: BatchUnit,
}

/// Orchestrates a full-book translation run
pub struct BookTranslator {
    service: TranslationService,
    limiter: TierLimiter,
    cancel: CancelFlag,
}

impl BookTranslator {
    /// Create a new orchestrator
    pub fn new(service: TranslationService, limiter: TierLimiter, cancel: CancelFlag) -> Self {
        Self { service, limiter, cancel }
    }

    /// Translate every paragraph of the book in place.
    ///
    /// `progress` receives (completed batches, total batches). On success
    /// every paragraph carries translated content, by oracle, memory or
    /// fallback to its original text. Cancellation aborts with an error and
    /// leaves the book unsaved.
    pub async fn translate_book(
        &self,
        book: &mut Book,
        progress: impl Fn(usize, usize) + Clone + Send + Sync + 'static,
    ) -> Result<TranslationMetrics, TranslationError> {
        let started = Instant::now();
        let mut metrics = TranslationMetrics::default();
        metrics.source_tokens = book
            .chapters
            .iter()
            .flat_map(|c| c.paragraphs.iter())
            .map(|p| estimate_tokens(&p.content))
            .sum();

        let items = self.plan(book);
        let total_batches = items.len();
        info!(
            "Translating {} paragraphs in {} batches via {}",
            book.paragraph_count(),
            total_batches,
            self.service.provider_name()
        );

        let completed_batches = Arc::new(AtomicUsize::new(0));
        let batch_results = stream::iter(items)
            .map(|item| {
                let service = self.service.clone();
                let limiter = self.limiter.clone();
                let cancel = self.cancel.clone();
                let completed_batches = completed_batches.clone();
                let progress = progress.clone();

                async move {
                    let _permit = limiter.acquire(item.tier).await;

                    let mut results = Vec::with_capacity(item.batch.units.len());
                    for unit in item.batch.units {
                        if cancel.is_cancelled() {
                            results.push(UnitResult {
                                unit,
                                outcome: Err(TranslationError::Cancelled),
                                latency_ms: 0,
                            });
                            continue;
                        }
                        let unit_started = Instant::now();
                        let outcome = service.translate_text(&unit.text).await;
                        let latency_ms = unit_started.elapsed().as_millis() as u64;
                        results.push(UnitResult { unit, outcome, latency_ms });
                    }

                    // Pacing: hold the tier slot through the delay
                    tokio::time::sleep(limiter.delay(item.tier)).await;

                    let done = completed_batches.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(done, total_batches);

                    (item.chapter_index, results)
                }
            })
            .buffer_unordered(self.limiter.table().total_workers())
            .collect::<Vec<_>>()
            .await;

        if self.cancel.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }

        // Reassemble sub-chunks by (chapter, paragraph, part); order is
        // restored from the model regardless of completion order.
        let mut translated: BTreeMap<(usize, usize), BTreeMap<usize, String>> = BTreeMap::new();
        let mut failures: Vec<FailedUnit> = Vec::new();

        for (chapter_index, results) in batch_results {
            for result in results {
                match result.outcome {
                    Ok((text, usage, outcome)) => {
                        match outcome {
                            UnitOutcome::MemoryHit => metrics.memory_hits += 1,
                            UnitOutcome::Oracle => metrics.oracle_calls += 1,
                        }
                        if let Some(usage) = usage {
                            metrics.record_unit(
                                chapter_index,
                                result.unit.paragraph_index,
                                result.unit.part,
                                usage,
                                result.latency_ms,
                                &self.service.options,
                            );
                        }
                        translated
                            .entry((chapter_index, result.unit.paragraph_index))
                            .or_default()
                            .insert(result.unit.part, text);
                    }
                    Err(e) => {
                        error!(
                            "Chapter {} paragraph {} failed: {}",
                            chapter_index, result.unit.paragraph_index, e
                        );
                        failures.push(FailedUnit { chapter_index, unit: result.unit });
                    }
                }
            }
        }

        if !failures.is_empty() {
            info!("Retry pass over {} failed units", failures.len());
            self.retry_pass(failures, &mut translated, &mut metrics).await?;
        }

        for (chapter_index, chapter) in book.chapters.iter_mut().enumerate() {
            for (paragraph_index, paragraph) in chapter.paragraphs.iter_mut().enumerate() {
                if let Some(parts) = translated.get(&(chapter_index, paragraph_index)) {
                    paragraph.translated = parts.values().cloned().collect::<Vec<_>>().concat();
                }
            }
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Translation finished: {} memory hits, {} oracle calls, {} retries, {} fallbacks",
            metrics.memory_hits, metrics.oracle_calls, metrics.retry_count, metrics.fallback_count
        );
        Ok(metrics)
    }

    /// Batch every chapter and classify each batch into its tier
    fn plan(&self, book: &Book) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for (chapter_index, chapter) in book.chapters.iter().enumerate() {
            let batches = batch_paragraphs(
                &chapter.paragraphs,
                self.service.options.max_tokens_per_request,
            );
            for batch in batches {
                let tier = self.limiter.table().classify(batch.max_word_count());
                items.push(WorkItem { chapter_index, tier, batch });
            }
        }
        items
    }

    /// Retry failed units sequentially with a fixed delay. Exhausted units
    /// fall back to their original text, recorded once per paragraph.
    async fn retry_pass(
        &self,
        failures: Vec<FailedUnit>,
        translated: &mut BTreeMap<(usize, usize), BTreeMap<usize, String>>,
        metrics: &mut TranslationMetrics,
    ) -> Result<(), TranslationError> {
        let max_retries = self.service.options.max_retries;
        let delay = self.service.options.retry_delay();
        let mut fallback_paragraphs: HashSet<(usize, usize)> = HashSet::new();

        for failed in failures {
            let key = (failed.chapter_index, failed.unit.paragraph_index);
            let mut resolved = None;

            for attempt in 1..=max_retries {
                if self.cancel.is_cancelled() {
                    return Err(TranslationError::Cancelled);
                }
                tokio::time::sleep(delay).await;
                metrics.retry_count += 1;

                let attempt_started = Instant::now();
                match self.service.translate_text(&failed.unit.text).await {
                    Ok((text, usage, outcome)) => {
                        match outcome {
                            UnitOutcome::MemoryHit => metrics.memory_hits += 1,
                            UnitOutcome::Oracle => metrics.oracle_calls += 1,
                        }
                        if let Some(usage) = usage {
                            metrics.record_unit(
                                failed.chapter_index,
                                failed.unit.paragraph_index,
                                failed.unit.part,
                                usage,
                                attempt_started.elapsed().as_millis() as u64,
                                &self.service.options,
                            );
                        }
                        resolved = Some(text);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "Retry {}/{} failed for chapter {} paragraph {}: {}",
                            attempt, max_retries, failed.chapter_index,
                            failed.unit.paragraph_index, e
                        );
                    }
                }
            }

            let text = match resolved {
                Some(text) => text,
                None => {
                    if fallback_paragraphs.insert(key) {
                        metrics.fallback_count += 1;
                        warn!(
                            "Falling back to original text for chapter {} paragraph {}",
                            failed.chapter_index, failed.unit.paragraph_index
                        );
                    }
                    failed.unit.text.clone()
                }
            };

            translated.entry(key).or_default().insert(failed.unit.part, text);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::model::{Chapter, Paragraph, ParagraphKind};
    use crate::providers::mock::MockProvider;
    use crate::translation::core::TranslationOptions;
    use crate::translation::TierTable;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn paragraph(index: usize, content: &str) -> Paragraph {
        Paragraph {
            id: format!("p{:04}", index),
            content: content.to_string(),
            translated: String::new(),
            kind: ParagraphKind::Text,
            address: format!("/html[0]/body[0]/p[{}]", index),
            attributes: Vec::new(),
            raw_fragment: String::new(),
        }
    }

    fn book(chapter_texts: &[&[&str]]) -> Book {
        let chapters = chapter_texts
            .iter()
            .enumerate()
            .map(|(i, texts)| Chapter {
                id: format!("ch{}", i),
                title: format!("Chapter {}", i + 1),
                paragraphs: texts
                    .iter()
                    .enumerate()
                    .map(|(j, t)| paragraph(j, t))
                    .collect(),
                raw_markup: String::new(),
                path: format!("OEBPS/ch{}.xhtml", i),
                styles: HashMap::new(),
            })
            .collect();
        Book {
            title: "Test Book".to_string(),
            author: "Author".to_string(),
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            chapters,
            resources: HashMap::new(),
            navigation: Vec::new(),
            cover_image: None,
            source_path: PathBuf::from("test.epub"),
        }
    }

    fn translator(provider: MockProvider, options: TranslationOptions) -> BookTranslator {
        let service = TranslationService::new(Arc::new(provider), None, options);
        BookTranslator::new(
            service,
            TierLimiter::new(TierTable::default()),
            CancelFlag::new(),
        )
    }

    fn fast_options() -> TranslationOptions {
        TranslationOptions {
            retry_delay_ms: 1,
            use_memory: false,
            ..TranslationOptions::default()
        }
    }

    #[tokio::test]
    async fn test_translate_book_should_populate_every_paragraph() {
        let mut book = book(&[
            &["First paragraph here.", "Second paragraph here."],
            &["Third paragraph in another chapter."],
        ]);
        let translator = translator(MockProvider::working(), fast_options());

        let metrics = translator.translate_book(&mut book, |_, _| {}).await.unwrap();

        assert!(book.is_fully_translated());
        assert_eq!(metrics.oracle_calls, 3);
        assert_eq!(metrics.fallback_count, 0);
        assert_eq!(
            book.chapters[0].paragraphs[0].translated,
            "[zh] First paragraph here."
        );
    }

    #[tokio::test]
    async fn test_exhausted_retries_should_fall_back_to_original_once() {
        let mut book = book(&[&["This paragraph will never translate."]]);
        let provider = MockProvider::failing();
        let counter = provider.clone();
        let mut options = fast_options();
        options.max_retries = 3;
        let translator = translator(provider, options);

        let metrics = translator.translate_book(&mut book, |_, _| {}).await.unwrap();

        assert!(book.is_fully_translated());
        assert_eq!(
            book.chapters[0].paragraphs[0].translated,
            "This paragraph will never translate."
        );
        assert_eq!(metrics.fallback_count, 1);
        assert_eq!(metrics.retry_count, 3);
        // One initial attempt plus three retries
        assert_eq!(counter.call_count(), 4);
    }

    #[tokio::test]
    async fn test_retry_pass_should_recover_transient_failures() {
        let mut book = book(&[&["A transiently failing paragraph."]]);
        let translator = translator(MockProvider::fail_first(1), fast_options());

        let metrics = translator.translate_book(&mut book, |_, _| {}).await.unwrap();

        assert_eq!(
            book.chapters[0].paragraphs[0].translated,
            "[zh] A transiently failing paragraph."
        );
        assert_eq!(metrics.fallback_count, 0);
        assert!(metrics.retry_count >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_should_return_error() {
        let mut book = book(&[&["Some text to translate."]]);
        let service = TranslationService::new(
            Arc::new(MockProvider::working()),
            None,
            fast_options(),
        );
        let cancel = CancelFlag::new();
        cancel.cancel();
        let translator =
            BookTranslator::new(service, TierLimiter::new(TierTable::default()), cancel);

        let result = translator.translate_book(&mut book, |_, _| {}).await;
        assert!(matches!(result, Err(TranslationError::Cancelled)));
    }

    #[tokio::test]
    async fn test_long_paragraph_should_reassemble_in_order() {
        let long_text = "word ".repeat(3000);
        let mut book = book(&[&[long_text.trim_end()]]);
        let mut options = fast_options();
        options.max_tokens_per_request = 500;
        let translator = translator(
            MockProvider::working().with_custom_response(|req| req.text.clone()),
            options,
        );

        let metrics = translator.translate_book(&mut book, |_, _| {}).await.unwrap();

        // Identity oracle: reassembled sub-chunks must reproduce the source
        assert_eq!(book.chapters[0].paragraphs[0].translated, long_text.trim_end());
        assert!(metrics.oracle_calls >= 2, "long paragraph should split");
    }

    #[tokio::test]
    async fn test_metrics_should_carry_per_unit_breakdown() {
        let mut book = book(&[
            &["First paragraph here.", "Second paragraph here."],
            &["Third paragraph in another chapter."],
        ]);
        let translator = translator(MockProvider::working(), fast_options());

        let metrics = translator.translate_book(&mut book, |_, _| {}).await.unwrap();

        assert_eq!(metrics.units.len(), 3);
        let mut keys: Vec<(usize, usize)> = metrics
            .units
            .iter()
            .map(|u| (u.chapter_index, u.paragraph_index))
            .collect();
        keys.sort();
        assert_eq!(keys, vec![(0, 0), (0, 1), (1, 0)]);
        assert_eq!(
            metrics.prompt_tokens,
            metrics.units.iter().map(|u| u.usage.prompt_tokens).sum::<u64>()
        );
        assert_eq!(
            metrics.completion_tokens,
            metrics.units.iter().map(|u| u.usage.completion_tokens).sum::<u64>()
        );
    }

    #[tokio::test]
    async fn test_progress_should_reach_total_batches() {
        let mut book = book(&[&["One.", "Two.", "Three.", "Four."]]);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let translator = translator(MockProvider::working(), fast_options());

        translator
            .translate_book(&mut book, move |done, total| {
                if done == total {
                    seen_clone.store(total, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        assert!(seen.load(Ordering::SeqCst) >= 1);
    }
}
