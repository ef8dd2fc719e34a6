/*!
 * Common test utilities for babelbook tests
 */

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().context("Failed to create temporary directory")
}

/// Create a test file with specified content
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    std::fs::write(&file_path, content)
        .with_context(|| format!("Failed to create test file: {:?}", file_path))?;
    Ok(file_path)
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const CONTENT_OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Test Book</dc:title>
    <dc:creator>Jane Tester</dc:creator>
    <dc:language>en</dc:language>
  </metadata>
  <manifest>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>
"#;

const TOC_NCX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="ch1.xhtml"/>
    </navPoint>
    <navPoint id="n2" playOrder="2">
      <navLabel><text>Chapter Two</text></navLabel>
      <content src="ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>
"#;

const CHAPTER_ONE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter One</title></head>
<body>
<h1>Chapter One</h1>
<p>The sun rose over the quiet harbor.</p>
<p>Fishing boats drifted out with the tide.</p>
</body>
</html>
"#;

const CHAPTER_TWO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter Two</title></head>
<body>
<h1>Chapter Two</h1>
<p>Evening settled across the town.</p>
</body>
</html>
"#;

const STYLE_CSS: &str = "body { margin: 1em; }\n";

/// Build a small but complete EPUB fixture: container, OPF, NCX, two
/// chapters and a stylesheet. The zip is written directly so the fixture
/// does not depend on the packaging code under test.
pub fn build_test_epub(dir: &Path) -> Result<PathBuf> {
    let epub_path = dir.join("fixture.epub");
    let file = File::create(&epub_path)
        .with_context(|| format!("Failed to create fixture archive: {:?}", epub_path))?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    let entries = [
        ("META-INF/container.xml", CONTAINER_XML),
        ("OEBPS/content.opf", CONTENT_OPF),
        ("OEBPS/toc.ncx", TOC_NCX),
        ("OEBPS/ch1.xhtml", CHAPTER_ONE),
        ("OEBPS/ch2.xhtml", CHAPTER_TWO),
        ("OEBPS/style.css", STYLE_CSS),
    ];
    for (name, content) in entries {
        zip.start_file(name, deflated)?;
        zip.write_all(content.as_bytes())?;
    }

    zip.finish().context("Failed to finish fixture archive")?;
    Ok(epub_path)
}
