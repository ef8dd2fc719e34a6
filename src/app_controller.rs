/*!
 * Application controller: wires configuration, provider, memory and the
 * translation engine into the load / translate / reconstruct / save workflow.
 */

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use crate::app_config::{Config, ProviderKind};
use crate::book::reconstruct::reconstruct_chapter;
use crate::book::{load_book, package, LoadedBook};
use crate::errors::AppError;
use crate::memory::TranslationMemory;
use crate::providers::azure::AzureProvider;
use crate::providers::openai::OpenAiProvider;
use crate::providers::Provider;
use crate::translation::{BookTranslator, CancelFlag, TierLimiter, TranslationService};

/// Main application controller for book translation
pub struct Controller {
    config: Config,
    cancel: CancelFlag,
}

impl Controller {
    /// Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config, cancel: CancelFlag::new() })
    }

    /// Handle for requesting cancellation from another task or a signal
    /// handler
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the main workflow: load, translate, reconstruct and save
    pub async fn run(&self, input: &Path, output: &Path) -> Result<()> {
        let start_time = std::time::Instant::now();

        let provider = self.build_provider();
        provider
            .validate_configuration()
            .await
            .context("Backend configuration check failed")?;

        let mut loaded = load_book(
            input,
            &self.config.source_language,
            &self.config.target_language,
        )?;
        info!(
            "Loaded \"{}\" by {}: {} chapters, {} paragraphs, {} resources",
            loaded.book.title,
            loaded.book.author,
            loaded.book.chapters.len(),
            loaded.book.paragraph_count(),
            loaded.book.resources.len()
        );

        let memory = self.open_memory();
        let service = TranslationService::new(
            provider,
            memory.clone(),
            self.config.translation_options(),
        );
        let translator = BookTranslator::new(
            service,
            TierLimiter::new(self.config.tiers.clone()),
            self.cancel.clone(),
        );

        info!(
            "Translating {} -> {} via {}",
            self.config.source_language,
            self.config.target_language,
            self.config.provider.kind.display_name()
        );

        let progress_bar = ProgressBar::new(0);
        let template = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template.progress_chars("█▓▒░"));
        progress_bar.set_message("Translating");

        let pb = progress_bar.clone();
        let metrics = translator
            .translate_book(&mut loaded.book, move |done, total| {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            })
            .await?;
        progress_bar.finish_with_message("Translation complete");

        self.save_book(&loaded, output)?;

        info!(
            "Done in {:.1}s: {} memory hits, {} oracle calls, {} retries, {} fallbacks, \
             {} prompt / {} completion tokens (est. cost {:.4})",
            start_time.elapsed().as_secs_f64(),
            metrics.memory_hits,
            metrics.oracle_calls,
            metrics.retry_count,
            metrics.fallback_count,
            metrics.prompt_tokens,
            metrics.completion_tokens,
            metrics.estimated_cost
        );

        if let Some(memory) = memory {
            self.maintain_memory(&memory).await;
        }

        Ok(())
    }

    /// Load a book and return a plain-text preview of one chapter.
    ///
    /// The index is validated against the chapter count before any other
    /// work happens.
    pub fn preview_chapter(&self, loaded: &LoadedBook, index: usize) -> Result<String, AppError> {
        let chapter = loaded.book.chapters.get(index).ok_or_else(|| {
            AppError::Validation(format!(
                "Chapter index {} out of range (book has {} chapters)",
                index,
                loaded.book.chapters.len()
            ))
        })?;

        let mut preview = format!("# {} ({})\n", chapter.title, chapter.path);
        for paragraph in &chapter.paragraphs {
            let text = if paragraph.translated.is_empty() {
                &paragraph.content
            } else {
                &paragraph.translated
            };
            preview.push_str("\n");
            preview.push_str(text);
            preview.push('\n');
        }
        Ok(preview)
    }

    /// Write translated chapters back into the extracted tree, update the
    /// package language and repackage.
    ///
    /// Every chapter path is checked before anything is written, so a missing
    /// path aborts the save without producing a partial container.
    fn save_book(&self, loaded: &LoadedBook, output: &Path) -> Result<()> {
        let workdir = loaded.workdir.path();

        for chapter in &loaded.book.chapters {
            let target = workdir.join(&chapter.path);
            if !target.is_file() {
                return Err(crate::errors::BookError::ChapterPathMissing(
                    chapter.path.clone(),
                )
                .into());
            }
        }

        for chapter in &loaded.book.chapters {
            let markup = reconstruct_chapter(chapter);
            package::write_text_file(&workdir.join(&chapter.path), &markup)
                .with_context(|| format!("write chapter {}", chapter.path))?;
        }

        let opf_file = workdir.join(&loaded.opf_path);
        let opf_text = package::read_text_file(&opf_file).context("read package document")?;
        let rewritten =
            package::rewrite_language_tag(&opf_text, &self.config.target_language);
        package::write_text_file(&opf_file, &rewritten).context("write package document")?;

        package::repackage_directory(workdir, output)
            .map_err(|e| crate::errors::BookError::AssemblyFailed(e.to_string()))?;
        info!("Saved translated book to {:?}", output);
        Ok(())
    }

    fn build_provider(&self) -> Arc<dyn Provider> {
        let p = &self.config.provider;
        match p.kind {
            ProviderKind::OpenAI => Arc::new(
                OpenAiProvider::new(&p.api_key, &p.endpoint, &p.model)
                    .with_temperature(p.temperature)
                    .with_top_p(p.top_p)
                    .with_retries(p.max_retries, p.backoff_base_ms)
                    .with_rate_limit(p.rate_limit.unwrap_or(0)),
            ),
            ProviderKind::Azure => Arc::new(
                AzureProvider::new(&p.api_key, &p.endpoint, &p.deployment)
                    .with_api_version(&p.api_version)
                    .with_temperature(p.temperature)
                    .with_top_p(p.top_p)
                    .with_retries(p.max_retries, p.backoff_base_ms)
                    .with_rate_limit(p.rate_limit.unwrap_or(0)),
            ),
        }
    }

    /// Open the translation memory. Failures degrade to running without a
    /// memory rather than failing the run.
    fn open_memory(&self) -> Option<TranslationMemory> {
        if !self.config.memory.enabled {
            return None;
        }

        let result = match &self.config.memory.database_path {
            Some(path) => {
                crate::memory::MemoryConnection::new(path).map(TranslationMemory::new)
            }
            None => TranslationMemory::open_default(),
        };

        match result {
            Ok(memory) => Some(memory),
            Err(e) => {
                warn!("Translation memory unavailable, continuing without it: {}", e);
                None
            }
        }
    }

    async fn maintain_memory(&self, memory: &TranslationMemory) {
        match memory.stats().await {
            Ok(stats) => info!(
                "Translation memory: {} entries across {} language pairs",
                stats.total_entries, stats.language_pairs
            ),
            Err(e) => warn!("Could not read translation memory stats: {}", e),
        }

        let retention = ChronoDuration::days(i64::from(self.config.memory.retention_days));
        if let Err(e) = memory.optimize_storage(retention).await {
            warn!("Translation memory maintenance failed: {}", e);
        }
    }
}
