/*!
 * Translation memory repository.
 *
 * Lookup is exact-first (sha256 of the source text) with a fuzzy fallback
 * over the same language pair. Hits bump the usage counter and last-used
 * timestamp. Storage failures never fail a translation run: callers treat a
 * memory error as a cache miss and proceed to the provider.
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use rusqlite::{params, Connection, Row};
use sha2::{Digest, Sha256};

use super::{fuzzy, MemoryConnection, MemoryEntry, SIMILARITY_FLOOR};

/// Aggregate statistics over the stored entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    /// Total number of stored entries
    pub total_entries: usize,
    /// Number of distinct (source, target) language pairs
    pub language_pairs: usize,
}

/// Repository over the translation memory table
#[derive(Clone)]
pub struct TranslationMemory {
    db: MemoryConnection,
}

impl TranslationMemory {
    /// Create a repository over an existing connection
    pub fn new(db: MemoryConnection) -> Self {
        Self { db }
    }

    /// Open the memory at the default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(MemoryConnection::new_default()?))
    }

    /// Create an in-memory repository (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(MemoryConnection::new_in_memory()?))
    }

    /// Stable hash of a source text segment
    pub fn source_hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a translation for the given text and language pair.
    ///
    /// Tries the exact hash key first, then scans the language pair for the
    /// most similar entry at or above `min_similarity` (never below the
    /// global floor). Ties on similarity resolve to the most recently used
    /// entry. A hit updates the usage counter and last-used timestamp.
    pub async fn find_match(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        min_similarity: f64,
    ) -> Result<Option<MemoryEntry>> {
        let hash = Self::source_hash(text);
        let source = source_language.to_string();
        let target = target_language.to_string();
        let needle = text.to_string();
        let threshold = min_similarity.max(SIMILARITY_FLOOR);

        let found = self
            .db
            .execute_async(move |conn| {
                if let Some(entry) = query_exact(conn, &hash, &source, &target)? {
                    debug!("Memory hit (exact) for {}->{}", source, target);
                    touch_entry(conn, &hash, &source, &target)?;
                    return Ok(Some(entry));
                }

                let candidates = query_language_pair(conn, &source, &target)?;
                let mut best: Option<(f64, MemoryEntry)> = None;
                for entry in candidates {
                    let score = fuzzy::similarity(&needle, &entry.source_text);
                    if score < threshold {
                        continue;
                    }
                    let better = match &best {
                        None => true,
                        Some((best_score, best_entry)) => {
                            score > *best_score
                                || (score == *best_score
                                    && entry.last_used_at > best_entry.last_used_at)
                        }
                    };
                    if better {
                        best = Some((score, entry));
                    }
                }

                if let Some((score, entry)) = best {
                    debug!(
                        "Memory hit (fuzzy, {:.3}) for {}->{}",
                        score, source, target
                    );
                    let best_hash = Self::source_hash(&entry.source_text);
                    touch_entry(conn, &best_hash, &source, &target)?;
                    return Ok(Some(entry));
                }

                Ok(None)
            })
            .await?;

        Ok(found)
    }

    /// Store a translated segment, replacing any existing entry for the
    /// same source text and language pair.
    pub async fn store(&self, entry: &MemoryEntry) -> Result<()> {
        let entry = entry.clone();
        let hash = Self::source_hash(&entry.source_text);

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO translation_memory
                     (source_hash, source_language, target_language, source_text,
                      translated_text, created_at, last_used_at, use_count,
                      similarity_score, context)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        hash,
                        entry.source_language,
                        entry.target_language,
                        entry.source_text,
                        entry.translated_text,
                        entry.created_at.to_rfc3339(),
                        entry.last_used_at.to_rfc3339(),
                        entry.use_count,
                        entry.similarity_score,
                        entry.context,
                    ],
                )
                .context("Failed to store translation memory entry")?;
                Ok(())
            })
            .await
    }

    /// Return up to `max_results` entries for the language pair ranked by
    /// similarity to `text`, best first. Entries below the floor are omitted.
    pub async fn find_similar_entries(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        max_results: usize,
    ) -> Result<Vec<(MemoryEntry, f64)>> {
        let source = source_language.to_string();
        let target = target_language.to_string();
        let needle = text.to_string();

        self.db
            .execute_async(move |conn| {
                let candidates = query_language_pair(conn, &source, &target)?;
                let mut scored: Vec<(MemoryEntry, f64)> = candidates
                    .into_iter()
                    .map(|entry| {
                        let score = fuzzy::similarity(&needle, &entry.source_text);
                        (entry, score)
                    })
                    .filter(|(_, score)| *score >= SIMILARITY_FLOOR)
                    .collect();

                scored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                });
                scored.truncate(max_results);
                Ok(scored)
            })
            .await
    }

    /// Delete entries not used within the retention window, then compact.
    /// Returns the number of deleted entries.
    pub async fn optimize_storage(&self, retention: Duration) -> Result<usize> {
        let cutoff = (Utc::now() - retention).to_rfc3339();

        let deleted = self
            .db
            .execute_async(move |conn| {
                let deleted = conn
                    .execute(
                        "DELETE FROM translation_memory WHERE last_used_at < ?1",
                        params![cutoff],
                    )
                    .context("Failed to purge stale memory entries")?;
                Ok(deleted)
            })
            .await?;

        if deleted > 0 {
            info!("Purged {} stale translation memory entries", deleted);
            self.db.vacuum()?;
        }

        Ok(deleted)
    }

    /// Export all entries as a flat list, suitable for JSON serialization.
    pub async fn export_entries(&self) -> Result<Vec<MemoryEntry>> {
        self.db
            .execute_async(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT source_text, translated_text, source_language, target_language,
                            created_at, last_used_at, use_count, similarity_score, context
                     FROM translation_memory
                     ORDER BY source_language, target_language, created_at",
                )?;
                let rows = stmt
                    .query_map([], entry_from_row)
                    .context("Failed to read memory entries")?;

                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                Ok(entries)
            })
            .await
    }

    /// Import entries, replacing existing ones with the same key.
    /// Returns the number of imported entries.
    pub async fn import_entries(&self, entries: Vec<MemoryEntry>) -> Result<usize> {
        let mut imported = 0;
        for entry in &entries {
            match self.store(entry).await {
                Ok(()) => imported += 1,
                Err(e) => warn!("Skipping unimportable memory entry: {}", e),
            }
        }
        info!("Imported {} translation memory entries", imported);
        Ok(imported)
    }

    /// Aggregate statistics over the stored entries
    pub async fn stats(&self) -> Result<MemoryStats> {
        self.db
            .execute_async(|conn| {
                let total_entries: usize = conn.query_row(
                    "SELECT COUNT(*) FROM translation_memory",
                    [],
                    |row| row.get(0),
                )?;
                let language_pairs: usize = conn.query_row(
                    "SELECT COUNT(*) FROM (SELECT DISTINCT source_language, target_language
                                           FROM translation_memory)",
                    [],
                    |row| row.get(0),
                )?;
                Ok(MemoryStats { total_entries, language_pairs })
            })
            .await
    }
}

fn query_exact(
    conn: &Connection,
    hash: &str,
    source: &str,
    target: &str,
) -> Result<Option<MemoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT source_text, translated_text, source_language, target_language,
                created_at, last_used_at, use_count, similarity_score, context
         FROM translation_memory
         WHERE source_hash = ?1 AND source_language = ?2 AND target_language = ?3",
    )?;
    let mut rows = stmt.query_map(params![hash, source, target], entry_from_row)?;

    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

fn query_language_pair(conn: &Connection, source: &str, target: &str) -> Result<Vec<MemoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT source_text, translated_text, source_language, target_language,
                created_at, last_used_at, use_count, similarity_score, context
         FROM translation_memory
         WHERE source_language = ?1 AND target_language = ?2",
    )?;
    let rows = stmt.query_map(params![source, target], entry_from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn touch_entry(conn: &Connection, hash: &str, source: &str, target: &str) -> Result<()> {
    conn.execute(
        "UPDATE translation_memory
         SET use_count = use_count + 1, last_used_at = ?1
         WHERE source_hash = ?2 AND source_language = ?3 AND target_language = ?4",
        params![Utc::now().to_rfc3339(), hash, source, target],
    )
    .context("Failed to update memory usage counters")?;
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let created_at: String = row.get(4)?;
    let last_used_at: String = row.get(5)?;
    Ok(MemoryEntry {
        source_text: row.get(0)?,
        translated_text: row.get(1)?,
        source_language: row.get(2)?,
        target_language: row.get(3)?,
        created_at: parse_timestamp(&created_at),
        last_used_at: parse_timestamp(&last_used_at),
        use_count: row.get(6)?,
        similarity_score: row.get(7)?,
        context: row.get(8)?,
    })
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(source: &str, translated: &str) -> MemoryEntry {
        MemoryEntry::new(source, translated, "en", "zh")
    }

    #[tokio::test]
    async fn test_find_match_should_return_exact_hit() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("Hello world.", "你好，世界。")).await.unwrap();

        let hit = memory.find_match("Hello world.", "en", "zh", 0.8).await.unwrap();
        assert_eq!(hit.unwrap().translated_text, "你好，世界。");
    }

    #[tokio::test]
    async fn test_find_match_should_miss_for_other_language_pair() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("Hello world.", "你好，世界。")).await.unwrap();

        let hit = memory.find_match("Hello world.", "en", "fr", 0.8).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_find_match_should_return_fuzzy_hit_above_floor() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory
            .store(&entry("The quick brown fox jumps over the lazy dog.", "敏捷的棕色狐狸跳过懒狗。"))
            .await
            .unwrap();

        let hit = memory
            .find_match("The quick brown fox jumps over the lazy dogs.", "en", "zh", 0.8)
            .await
            .unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_find_match_should_reject_below_floor() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("Completely unrelated sentence.", "毫不相关。")).await.unwrap();

        let hit = memory.find_match("Nothing alike here at all.", "en", "zh", 0.0).await.unwrap();
        assert!(hit.is_none(), "floor must apply even when caller asks for 0.0");
    }

    #[tokio::test]
    async fn test_find_match_should_update_usage_counters() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("Hello world.", "你好，世界。")).await.unwrap();

        memory.find_match("Hello world.", "en", "zh", 0.8).await.unwrap();
        memory.find_match("Hello world.", "en", "zh", 0.8).await.unwrap();

        let exported = memory.export_entries().await.unwrap();
        assert_eq!(exported[0].use_count, 2);
    }

    #[tokio::test]
    async fn test_store_should_replace_existing_entry() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("Hello world.", "first")).await.unwrap();
        memory.store(&entry("Hello world.", "second")).await.unwrap();

        let stats = memory.stats().await.unwrap();
        assert_eq!(stats.total_entries, 1);

        let hit = memory.find_match("Hello world.", "en", "zh", 0.8).await.unwrap();
        assert_eq!(hit.unwrap().translated_text, "second");
    }

    #[tokio::test]
    async fn test_find_similar_entries_should_rank_best_first() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("A tale of two cities.", "双城记。")).await.unwrap();
        memory.store(&entry("A tale of two kitties.", "两只猫的故事。")).await.unwrap();

        let results = memory
            .find_similar_entries("A tale of two cities.", "en", "zh", 10)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0.source_text, "A tale of two cities.");
        assert_eq!(results[0].1, 1.0);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[tokio::test]
    async fn test_optimize_storage_should_purge_stale_entries() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        let mut old = entry("Old sentence here.", "旧句子。");
        old.last_used_at = Utc::now() - Duration::days(400);
        memory.store(&old).await.unwrap();
        memory.store(&entry("Fresh sentence here.", "新句子。")).await.unwrap();

        let deleted = memory.optimize_storage(Duration::days(90)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(memory.stats().await.unwrap().total_entries, 1);
    }

    #[tokio::test]
    async fn test_export_import_should_round_trip() {
        let memory = TranslationMemory::new_in_memory().unwrap();
        memory.store(&entry("Hello world.", "你好，世界。")).await.unwrap();
        memory.store(&MemoryEntry::new("Bonjour.", "你好。", "fr", "zh")).await.unwrap();

        let exported = memory.export_entries().await.unwrap();
        assert_eq!(exported.len(), 2);

        let other = TranslationMemory::new_in_memory().unwrap();
        let imported = other.import_entries(exported).await.unwrap();
        assert_eq!(imported, 2);

        let stats = other.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.language_pairs, 2);
    }
}
