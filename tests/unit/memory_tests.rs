/*!
 * Translation memory persistence tests
 */

use anyhow::Result;
use babelbook::memory::{MemoryConnection, MemoryEntry, TranslationMemory};

use crate::common;

#[tokio::test]
async fn test_entries_should_survive_reopening_the_database() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let db_path = tmp.path().join("memory.db");

    {
        let memory = TranslationMemory::new(MemoryConnection::new(&db_path)?);
        memory
            .store(&MemoryEntry::new("Good morning.", "Bonjour.", "en", "fr"))
            .await?;
    }

    // A fresh connection to the same file sees the stored entry
    let memory = TranslationMemory::new(MemoryConnection::new(&db_path)?);
    let hit = memory.find_match("Good morning.", "en", "fr", 0.8).await?;
    let entry = hit.expect("entry should persist across connections");
    assert_eq!(entry.translated_text, "Bonjour.");

    // The hit itself counts as a use and is durably recorded
    let exported = memory.export_entries().await?;
    assert_eq!(exported[0].use_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_import_should_merge_into_existing_store() -> Result<()> {
    let source = TranslationMemory::new_in_memory()?;
    source.store(&MemoryEntry::new("One.", "Un.", "en", "fr")).await?;
    source.store(&MemoryEntry::new("Two.", "Deux.", "en", "fr")).await?;

    let target = TranslationMemory::new_in_memory()?;
    target.store(&MemoryEntry::new("你好。", "Hello.", "zh", "en")).await?;

    let exported = source.export_entries().await?;
    let imported = target.import_entries(exported).await?;
    assert_eq!(imported, 2);

    let stats = target.stats().await?;
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.language_pairs, 2);

    let hit = target.find_match("Two.", "en", "fr", 0.8).await?;
    assert_eq!(hit.expect("imported entry").translated_text, "Deux.");
    Ok(())
}
