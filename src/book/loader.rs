/*!
 * Book loading.
 *
 * Extracts the EPUB container to a working directory, resolves the OPF
 * package document through `META-INF/container.xml`, and builds the in-memory
 * [`Book`] model: metadata, spine-ordered chapters with extracted paragraphs,
 * auxiliary resources, the navigation map and the cover image. The working
 * directory stays alive with the returned [`LoadedBook`] so the controller
 * can rewrite chapter files in place and repackage.
 */

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::Event;
use tempfile::TempDir;

use crate::book::extract::extract_paragraphs;
use crate::book::model::{Book, Chapter, NavPoint, Resource, ResourceKind};
use crate::book::package;
use crate::errors::BookError;

/// Chapter media types recognised in the manifest.
const CHAPTER_MEDIA_TYPES: &[&str] = &["application/xhtml+xml", "text/html"];

/// A loaded book together with its extraction working directory.
pub struct LoadedBook {
    /// The in-memory book model
    pub book: Book,
    /// Extraction directory; dropped (and deleted) with this value
    pub workdir: TempDir,
    /// OPF path relative to the extraction directory
    pub opf_path: PathBuf,
}

/// One manifest item of the OPF package document.
#[derive(Debug, Clone, Default)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

/// Load a book from an EPUB file.
///
/// Fatal input errors (unreadable file, malformed container, no chapters)
/// surface here, before any translation work starts.
pub fn load_book(path: &Path, source_language: &str, target_language: &str) -> Result<LoadedBook> {
    if !path.is_file() {
        return Err(BookError::InputUnreadable(path.display().to_string()).into());
    }

    let workdir = TempDir::new().context("create extraction dir")?;
    package::extract_archive(path, workdir.path())
        .map_err(|e| BookError::InvalidArchive(e.to_string()))?;

    let container_xml = package::read_text_file(&workdir.path().join("META-INF/container.xml"))
        .map_err(|e| BookError::InvalidArchive(e.to_string()))?;
    let opf_rel = parse_container_rootfile(&container_xml)
        .ok_or_else(|| BookError::InvalidArchive("no rootfile in container.xml".to_string()))?;
    let opf_abs = workdir.path().join(&opf_rel);
    let opf_dir = opf_abs.parent().unwrap_or(workdir.path()).to_path_buf();
    let opf_text = package::read_text_file(&opf_abs)
        .map_err(|e| BookError::InvalidArchive(e.to_string()))?;

    let opf = parse_opf(&opf_text)?;
    debug!(
        "OPF parsed: {} manifest items, {} spine refs",
        opf.manifest.len(),
        opf.spine.len()
    );

    let mut chapters = Vec::new();
    let mut resources = HashMap::new();
    let mut cover_image = None;
    let mut navigation = Vec::new();

    let spine_ids: Vec<&String> = opf.spine.iter().collect();
    for item in opf.manifest.values() {
        let item_path = opf_dir.join(&item.href);
        let in_spine = spine_ids.iter().any(|id| **id == item.id);
        let is_chapter = in_spine && CHAPTER_MEDIA_TYPES.contains(&item.media_type.as_str());
        if is_chapter {
            continue; // chapters handled below, in spine order
        }
        if item.media_type == "application/x-dtbncx+xml" {
            if let Ok(ncx) = package::read_text_file(&item_path) {
                navigation = parse_ncx(&ncx);
            }
            continue;
        }
        let data = std::fs::read(&item_path).unwrap_or_else(|e| {
            warn!("Resource {} unreadable: {}", item.href, e);
            Vec::new()
        });
        if item.properties.contains("cover-image")
            || (opf.cover_id.as_deref() == Some(&item.id)
                && item.media_type.starts_with("image/"))
        {
            cover_image = Some(data.clone());
        }
        resources.insert(
            item.href.clone(),
            Resource {
                id: item.id.clone(),
                path: item.href.clone(),
                media_type: item.media_type.clone(),
                kind: ResourceKind::from_media_type(&item.media_type),
                data,
            },
        );
    }

    for idref in &opf.spine {
        let Some(item) = opf.manifest.get(idref) else {
            warn!("Spine idref {} has no manifest item, skipping", idref);
            continue;
        };
        if !CHAPTER_MEDIA_TYPES.contains(&item.media_type.as_str()) {
            continue;
        }
        let chapter_path = opf_dir.join(&item.href);
        let raw_markup = package::read_text_file(&chapter_path)
            .map_err(|e| BookError::InvalidArchive(e.to_string()))?;
        let paragraphs = extract_paragraphs(&raw_markup);
        if paragraphs.is_empty() {
            warn!("Chapter {} yielded no paragraphs", item.href);
        }
        let title = chapter_title(&paragraphs, &item.id);
        chapters.push(Chapter {
            id: item.id.clone(),
            title,
            paragraphs,
            raw_markup,
            path: container_relative(&opf_rel, &item.href),
            styles: HashMap::new(),
        });
    }

    if chapters.is_empty() {
        return Err(BookError::ValidationFailed("book contains no chapters".to_string()).into());
    }

    let book = Book {
        title: opf.title.unwrap_or_else(|| "Untitled".to_string()),
        author: opf.creator.unwrap_or_default(),
        source_language: if source_language.is_empty() {
            opf.language.unwrap_or_default()
        } else {
            source_language.to_string()
        },
        target_language: target_language.to_string(),
        chapters,
        resources,
        navigation,
        cover_image,
        source_path: path.to_path_buf(),
    };

    Ok(LoadedBook { book, workdir, opf_path: PathBuf::from(opf_rel) })
}

/// Derive a chapter title from its first heading, falling back to the id.
fn chapter_title(paragraphs: &[crate::book::model::Paragraph], fallback: &str) -> String {
    use crate::book::model::ParagraphKind;
    paragraphs
        .iter()
        .find(|p| matches!(p.kind, ParagraphKind::Heading(_)))
        .map(|p| p.content.clone())
        .unwrap_or_else(|| fallback.to_string())
}

/// Join an href onto the OPF's directory, container-relative.
fn container_relative(opf_rel: &str, href: &str) -> String {
    match opf_rel.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, href),
        None => href.to_string(),
    }
}

/// Pull the `full-path` of the first rootfile out of container.xml.
fn parse_container_rootfile(container_xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(container_xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                for attr in e.attributes().with_checks(false).flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return attr.unescape_value().ok().map(|v| v.into_owned());
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
struct OpfPackage {
    title: Option<String>,
    creator: Option<String>,
    language: Option<String>,
    cover_id: Option<String>,
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<String>,
}

/// Parse the OPF package document: metadata, manifest, spine.
fn parse_opf(opf_text: &str) -> Result<OpfPackage> {
    let mut reader = Reader::from_str(opf_text);
    reader.config_mut().check_end_names = false;

    let mut opf = OpfPackage::default();
    let mut capture: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"title" => capture = Some("title"),
                    b"creator" => capture = Some("creator"),
                    b"language" => capture = Some("language"),
                    b"meta" => {
                        let mut is_cover = false;
                        let mut content = None;
                        for attr in e.attributes().with_checks(false).flatten() {
                            let value = attr.unescape_value().unwrap_or_default().into_owned();
                            match attr.key.as_ref() {
                                b"name" if value == "cover" => is_cover = true,
                                b"content" => content = Some(value),
                                _ => {}
                            }
                        }
                        if is_cover {
                            opf.cover_id = content;
                        }
                    }
                    b"item" => {
                        let mut item = ManifestItem::default();
                        for attr in e.attributes().with_checks(false).flatten() {
                            let value = attr.unescape_value().unwrap_or_default().into_owned();
                            match attr.key.as_ref() {
                                b"id" => item.id = value,
                                b"href" => item.href = value,
                                b"media-type" => item.media_type = value,
                                b"properties" => item.properties = value,
                                _ => {}
                            }
                        }
                        if !item.id.is_empty() {
                            opf.manifest.insert(item.id.clone(), item);
                        }
                    }
                    b"itemref" => {
                        for attr in e.attributes().with_checks(false).flatten() {
                            if attr.key.as_ref() == b"idref" {
                                let value =
                                    attr.unescape_value().unwrap_or_default().into_owned();
                                opf.spine.push(value);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = capture.take() {
                    let text = e.unescape().unwrap_or_default().trim().to_string();
                    if !text.is_empty() {
                        match field {
                            "title" => opf.title = opf.title.take().or(Some(text)),
                            "creator" => opf.creator = opf.creator.take().or(Some(text)),
                            "language" => opf.language = opf.language.take().or(Some(text)),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::End(_)) => capture = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("malformed OPF: {}", e)),
            _ => {}
        }
    }

    Ok(opf)
}

/// Parse navPoints out of an NCX document into a flat navigation list.
fn parse_ncx(ncx_text: &str) -> Vec<NavPoint> {
    let mut reader = Reader::from_str(ncx_text);
    reader.config_mut().check_end_names = false;

    let mut nav = Vec::new();
    let mut in_text = false;
    let mut label = String::new();
    let mut order = 0u32;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"navPoint" => {
                    order += 1;
                    label.clear();
                }
                b"text" => in_text = true,
                b"content" => {
                    for attr in e.attributes().with_checks(false).flatten() {
                        if attr.key.as_ref() == b"src" {
                            let target = attr.unescape_value().unwrap_or_default().into_owned();
                            nav.push(NavPoint { label: label.clone(), target, order });
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                label = e.unescape().unwrap_or_default().trim().to_string();
                in_text = false;
            }
            Ok(Event::End(_)) => in_text = false,
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    nav
}
