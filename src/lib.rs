/*!
 * # babelbook
 *
 * A Rust library for structure-preserving EPUB book translation using LLM
 * chat-completion backends.
 *
 * ## Features
 *
 * - Load EPUB containers: metadata, spine-ordered chapters, resources,
 *   navigation and cover
 * - Extract translatable paragraphs with deterministic structural addresses
 * - Token-budgeted batching with sentence/word-boundary splitting
 * - SQLite-backed translation memory with fuzzy matching
 * - OpenAI and Azure OpenAI chat-completion backends
 * - Size-tiered concurrency with pacing and a bounded retry pass
 * - Markup-preserving chapter reconstruction and container repackaging
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `book`: Container packaging, loading, extraction and reconstruction
 * - `chunking`: Token estimation and batch formation
 * - `memory`: Durable translation memory
 * - `providers`: Chat-completion backend clients
 * - `translation`: Tiered concurrency, the core service and the orchestrator
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod book;
pub mod chunking;
pub mod errors;
pub mod language_utils;
pub mod memory;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use book::{load_book, Book, Chapter, LoadedBook, Paragraph};
pub use errors::{AppError, BookError, MemoryError, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use memory::TranslationMemory;
pub use translation::{BookTranslator, CancelFlag, TranslationService};
