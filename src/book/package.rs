/*!
 * EPUB container packaging.
 *
 * The container boundary is deliberately narrow: extract an archive to a
 * directory, read/write UTF-8 text files, and repackage a directory into an
 * archive. EPUB imposes one packaging rule the generic zip writer does not
 * know about: the first entry must be named `mimetype` and stored
 * uncompressed; all remaining entries are deflated.
 */

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Conventional first entry of an EPUB archive.
const MIMETYPE_ENTRY: &str = "mimetype";

/// Default content of the mimetype entry when the source archive lacks one.
const EPUB_MIMETYPE: &str = "application/epub+zip";

/// The declared-language tag in the OPF metadata.
static LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<dc:language[^>]*>[^<]*</dc:language>").expect("valid regex"));

/// Extract every entry of the archive into `dir`.
pub fn extract_archive(archive_path: &Path, dir: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("open archive: {}", archive_path.display()))?;
    let mut zip = ZipArchive::new(file).context("read archive")?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).context("archive entry")?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(anyhow!("archive entry escapes extraction dir: {}", entry.name()));
        };
        let target = dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("create dir: {}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).context("read archive entry")?;
        std::fs::write(&target, data)
            .with_context(|| format!("write extracted file: {}", target.display()))?;
    }
    Ok(())
}

/// Repackage a directory as an EPUB archive.
///
/// The `mimetype` entry is written first and stored uncompressed; every other
/// file is deflated. Entry names use forward slashes regardless of platform.
pub fn repackage_directory(dir: &Path, archive_path: &Path) -> Result<()> {
    let file = File::create(archive_path)
        .with_context(|| format!("create archive: {}", archive_path.display()))?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // mimetype first, uncompressed, per the container convention.
    let mimetype_path = dir.join(MIMETYPE_ENTRY);
    let mimetype = if mimetype_path.is_file() {
        std::fs::read_to_string(&mimetype_path).context("read mimetype entry")?
    } else {
        EPUB_MIMETYPE.to_string()
    };
    zip.start_file(MIMETYPE_ENTRY, stored).context("start mimetype entry")?;
    zip.write_all(mimetype.trim().as_bytes()).context("write mimetype entry")?;

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let relative = path
            .strip_prefix(dir)
            .with_context(|| format!("entry outside archive root: {}", path.display()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name == MIMETYPE_ENTRY {
            continue;
        }
        let data =
            std::fs::read(path).with_context(|| format!("read file: {}", path.display()))?;
        zip.start_file(&name, deflated)
            .with_context(|| format!("start archive entry: {}", name))?;
        zip.write_all(&data)
            .with_context(|| format!("write archive entry: {}", name))?;
    }

    zip.finish().context("finish archive")?;
    Ok(())
}

/// Read a text file as UTF-8, stripping a leading byte-order mark if present.
pub fn read_text_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read text file: {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(text.strip_prefix('\u{FEFF}').map(str::to_owned).unwrap_or(text))
}

/// Write a text file as UTF-8 without a byte-order mark.
pub fn write_text_file(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text.as_bytes())
        .with_context(|| format!("write text file: {}", path.display()))
}

/// Rewrite the declared language in OPF metadata to the target language.
///
/// Matches the single well-known `<dc:language>` tag pattern; everything else
/// in the document is left byte-identical.
pub fn rewrite_language_tag(opf_text: &str, target_language: &str) -> String {
    LANGUAGE_TAG
        .replace(opf_text, format!("<dc:language>{}</dc:language>", target_language))
        .into_owned()
}
