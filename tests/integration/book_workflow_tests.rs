/*!
 * End-to-end book translation workflow tests: load a real container,
 * translate it against the mock backend, reconstruct and repackage, then
 * verify the produced EPUB.
 */

use std::fs::File;
use std::sync::Arc;

use anyhow::Result;
use zip::ZipArchive;

use babelbook::book::reconstruct::reconstruct_chapter;
use babelbook::book::{load_book, package};
use babelbook::providers::mock::MockProvider;
use babelbook::translation::{
    BookTranslator, CancelFlag, TierLimiter, TierTable, TranslationOptions, TranslationService,
};

use crate::common;

fn mock_translator() -> BookTranslator {
    let options = TranslationOptions {
        use_memory: false,
        retry_delay_ms: 1,
        ..TranslationOptions::default()
    };
    let service = TranslationService::new(Arc::new(MockProvider::working()), None, options);
    BookTranslator::new(service, TierLimiter::new(TierTable::default()), CancelFlag::new())
}

#[test]
fn test_load_book_should_build_model_from_container() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let epub = common::build_test_epub(tmp.path())?;

    let loaded = load_book(&epub, "en", "zh")?;
    let book = &loaded.book;

    assert_eq!(book.title, "The Test Book");
    assert_eq!(book.author, "Jane Tester");
    assert_eq!(book.chapters.len(), 2, "spine order determines chapters");
    assert_eq!(book.chapters[0].title, "Chapter One");
    assert_eq!(book.chapters[0].path, "OEBPS/ch1.xhtml");
    assert_eq!(book.chapters[0].paragraphs.len(), 3);
    assert_eq!(
        book.chapters[1].paragraphs[1].content,
        "Evening settled across the town."
    );
    assert!(book.resources.contains_key("style.css"));
    assert_eq!(book.navigation.len(), 2);
    assert_eq!(book.navigation[0].label, "Chapter One");
    Ok(())
}

#[tokio::test]
async fn test_full_workflow_should_produce_translated_container() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let epub = common::build_test_epub(tmp.path())?;
    let mut loaded = load_book(&epub, "en", "zh")?;

    let metrics = mock_translator()
        .translate_book(&mut loaded.book, |_, _| {})
        .await?;
    assert!(loaded.book.is_fully_translated());
    assert_eq!(metrics.fallback_count, 0);

    // Reconstruct chapters in place, retag the language and repackage
    let workdir = loaded.workdir.path();
    for chapter in &loaded.book.chapters {
        let markup = reconstruct_chapter(chapter);
        package::write_text_file(&workdir.join(&chapter.path), &markup)?;
    }
    let opf_file = workdir.join(&loaded.opf_path);
    let opf_text = package::read_text_file(&opf_file)?;
    package::write_text_file(&opf_file, &package::rewrite_language_tag(&opf_text, "zh"))?;

    let output = tmp.path().join("translated.epub");
    package::repackage_directory(workdir, &output)?;

    // The container convention holds on the output archive
    let mut zip = ZipArchive::new(File::open(&output)?)?;
    assert_eq!(zip.by_index(0)?.name(), "mimetype");

    let extracted = tmp.path().join("roundtrip");
    package::extract_archive(&output, &extracted)?;

    let opf = package::read_text_file(&extracted.join("OEBPS/content.opf"))?;
    assert!(opf.contains("<dc:language>zh</dc:language>"));
    assert!(opf.contains("<dc:title>The Test Book</dc:title>"));

    let ch1 = package::read_text_file(&extracted.join("OEBPS/ch1.xhtml"))?;
    assert!(ch1.contains("[zh] The sun rose over the quiet harbor."));
    assert!(ch1.contains("[zh] Chapter One"));
    assert!(!ch1.contains(">The sun rose over the quiet harbor.<"));
    Ok(())
}

#[tokio::test]
async fn test_translated_output_should_be_loadable_again() -> Result<()> {
    let tmp = common::create_temp_dir()?;
    let epub = common::build_test_epub(tmp.path())?;
    let mut loaded = load_book(&epub, "en", "zh")?;

    mock_translator().translate_book(&mut loaded.book, |_, _| {}).await?;

    let workdir = loaded.workdir.path();
    for chapter in &loaded.book.chapters {
        package::write_text_file(
            &workdir.join(&chapter.path),
            &reconstruct_chapter(chapter),
        )?;
    }
    let output = tmp.path().join("translated.epub");
    package::repackage_directory(workdir, &output)?;

    let reloaded = load_book(&output, "zh", "en")?;
    assert_eq!(reloaded.book.chapters.len(), 2);
    assert!(reloaded.book.chapters[0]
        .paragraphs
        .iter()
        .all(|p| p.content.starts_with("[zh] ")));
    Ok(())
}
