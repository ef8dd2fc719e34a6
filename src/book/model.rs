/*!
 * Core document model types for book translation.
 *
 * These types provide a rich, JSON-serializable representation of an EPUB
 * book: chapters in reading order, their extracted paragraphs, auxiliary
 * resources and the navigation tree. The model carries no behavior; it is
 * built once by the loader, annotated in place by the translation
 * orchestrator and consumed once by the reconstructor.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A complete book with metadata, chapters and resources.
///
/// Chapter ordering is the book's reading order (the OPF spine order) and
/// must be preserved end to end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book title from the container metadata
    pub title: String,

    /// Book author from the container metadata
    pub author: String,

    /// Source language tag
    pub source_language: String,

    /// Target language tag
    pub target_language: String,

    /// Chapters in reading order
    pub chapters: Vec<Chapter>,

    /// Auxiliary resources keyed by container-relative path
    #[serde(default)]
    pub resources: HashMap<String, Resource>,

    /// Navigation tree (flattened table of contents)
    #[serde(default)]
    pub navigation: Vec<NavPoint>,

    /// Cover image bytes, if the container declares one
    #[serde(skip)]
    pub cover_image: Option<Vec<u8>>,

    /// Path the book was loaded from
    pub source_path: PathBuf,
}

impl Book {
    /// Total number of paragraphs across all chapters.
    pub fn paragraph_count(&self) -> usize {
        self.chapters.iter().map(|c| c.paragraphs.len()).sum()
    }

    /// Check that every paragraph carries translated content.
    pub fn is_fully_translated(&self) -> bool {
        self.chapters
            .iter()
            .flat_map(|c| c.paragraphs.iter())
            .all(|p| !p.translated.is_empty())
    }
}

/// A single chapter: one spine item of the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter identifier (manifest id)
    pub id: String,

    /// Chapter title, if one could be determined
    pub title: String,

    /// Extracted paragraphs in document order
    pub paragraphs: Vec<Paragraph>,

    /// Original raw markup, retained verbatim for reconstruction
    pub raw_markup: String,

    /// Container-relative path of the chapter file
    pub path: String,

    /// Free-form style attributes
    #[serde(default)]
    pub styles: HashMap<String, String>,
}

/// Semantic type of an extracted paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphKind {
    /// Plain body text
    Text,
    /// Heading with level 1-6
    Heading(u8),
    /// Block quotation
    Quote,
    /// Preformatted or code block
    Code,
    /// List item
    List,
    /// Table cell
    Table,
    /// Image caption or alt text
    Image,
    /// Anything else worth translating
    Other,
}

impl ParagraphKind {
    /// Map an element name to a paragraph kind.
    pub fn from_element(name: &str) -> Self {
        match name {
            "h1" => Self::Heading(1),
            "h2" => Self::Heading(2),
            "h3" => Self::Heading(3),
            "h4" => Self::Heading(4),
            "h5" => Self::Heading(5),
            "h6" => Self::Heading(6),
            "blockquote" => Self::Quote,
            "pre" | "code" => Self::Code,
            "li" | "dt" | "dd" => Self::List,
            "td" | "th" | "caption" => Self::Table,
            "figcaption" => Self::Image,
            "p" => Self::Text,
            _ => Self::Other,
        }
    }

    /// The element name used when regenerating a minimal document skeleton.
    pub fn skeleton_tag(&self) -> &'static str {
        match self {
            Self::Heading(1) => "h1",
            Self::Heading(2) => "h2",
            Self::Heading(3) => "h3",
            Self::Heading(4) => "h4",
            Self::Heading(5) => "h5",
            Self::Heading(_) => "h6",
            Self::Quote => "blockquote",
            Self::Code => "pre",
            _ => "p",
        }
    }
}

/// A translatable unit of text located inside a chapter's markup tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    /// Paragraph identifier, unique within the chapter
    pub id: String,

    /// Original trimmed, tag-stripped text content
    pub content: String,

    /// Translated text content; empty until the orchestrator fills it
    #[serde(default)]
    pub translated: String,

    /// Semantic type
    pub kind: ParagraphKind,

    /// Structural address locating the node in the chapter's markup tree,
    /// e.g. `/html[0]/body[0]/p[3]`
    pub address: String,

    /// Original attributes of the node, kept for round-tripping
    #[serde(default)]
    pub attributes: Vec<(String, String)>,

    /// Original raw markup fragment of the node
    #[serde(default)]
    pub raw_fragment: String,
}

impl Paragraph {
    /// Whitespace-delimited word count of the original content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Kind of auxiliary resource carried by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Font,
    Stylesheet,
    Other,
}

impl ResourceKind {
    /// Classify a resource by its MIME type.
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.starts_with("image/") {
            Self::Image
        } else if media_type.contains("font") || media_type == "application/vnd.ms-opentype" {
            Self::Font
        } else if media_type == "text/css" {
            Self::Stylesheet
        } else {
            Self::Other
        }
    }
}

/// A non-chapter file carried through the container untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier (manifest id)
    pub id: String,

    /// Container-relative path
    pub path: String,

    /// Declared MIME type
    pub media_type: String,

    /// Raw bytes
    #[serde(skip)]
    pub data: Vec<u8>,

    /// Resource classification
    pub kind: ResourceKind,
}

/// One entry of the navigation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavPoint {
    /// Display label
    pub label: String,

    /// Target path within the container
    pub target: String,

    /// Play order / nesting depth
    pub order: u32,
}
