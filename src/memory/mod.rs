/*!
 * Translation memory: a durable, fuzzy-matched cache of previously
 * translated text segments.
 *
 * Entries are addressed by (source language, target language, stable hash of
 * the source text) and persist in SQLite across runs. Lookup tries the exact
 * key first and falls back to the best approximate match by normalized edit
 * distance. Reads may run concurrently; the connection wrapper serializes
 * writes.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod connection;
pub mod fuzzy;
pub mod schema;
pub mod store;

pub use connection::MemoryConnection;
pub use store::{MemoryStats, TranslationMemory};

/// Minimum similarity a fuzzy match must reach regardless of caller options.
pub const SIMILARITY_FLOOR: f64 = 0.8;

/// One cached translation segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Original source text
    pub source_text: String,

    /// Translated text
    pub translated_text: String,

    /// Source language tag
    pub source_language: String,

    /// Target language tag
    pub target_language: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent lookup hit
    pub last_used_at: DateTime<Utc>,

    /// Number of lookup hits
    pub use_count: u32,

    /// Similarity/quality score recorded at creation (stored, never
    /// computed from translation output)
    pub similarity_score: f64,

    /// Free-form context tag, e.g. the book title
    #[serde(default)]
    pub context: String,
}

impl MemoryEntry {
    /// Create a fresh entry for a newly translated segment.
    pub fn new(
        source_text: impl Into<String>,
        translated_text: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            created_at: now,
            last_used_at: now,
            use_count: 0,
            similarity_score: 1.0,
            context: String::new(),
        }
    }

    /// Set the context tag.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}
