/*!
 * Chapter reconstruction.
 *
 * Rebuilds a chapter's markup by substituting translated text at each
 * paragraph's recorded structural address, leaving all other structure
 * untouched. Reconstruction of a chapter either fully succeeds or falls back
 * to a minimal valid skeleton regenerated from paragraph kinds; a
 * half-rewritten tree is never emitted. Serialization is strict XML (see
 * [`crate::book::markup`]), which repairs lenient HTML source on the way out.
 */

use log::warn;

use crate::book::markup::{self, MarkupChild, MarkupNode, MarkupTree};
use crate::book::model::Chapter;

/// Rebuild the chapter's full markup with translated paragraph content.
///
/// Paragraphs with empty translated content keep their original text (the
/// orchestrator guarantees this does not happen after a completed run, but
/// reconstruction must not depend on it).
pub fn reconstruct_chapter(chapter: &Chapter) -> String {
    let mut tree = markup::parse(&chapter.raw_markup);

    for paragraph in &chapter.paragraphs {
        let replacement = if paragraph.translated.is_empty() {
            &paragraph.content
        } else {
            &paragraph.translated
        };
        match locate_mut(&mut tree, &paragraph.address, &paragraph.content) {
            Some(node) => node.set_text(replacement),
            None => {
                warn!(
                    "Paragraph {} in chapter {} is unresolvable, regenerating skeleton",
                    paragraph.id, chapter.id
                );
                return skeleton(chapter);
            }
        }
    }

    markup::serialize(&tree)
}

/// Two-stage node lookup: exact structural address, then a linear scan by
/// trimmed text equality. Callers never see the two strategies separately.
fn locate_mut<'a>(
    tree: &'a mut MarkupTree,
    address: &str,
    content: &str,
) -> Option<&'a mut MarkupNode> {
    if markup::resolve(tree, address).is_some() {
        return markup::resolve_mut(tree, address);
    }
    markup::find_by_text_mut(tree, content)
}

/// Regenerate a minimal valid document from paragraph type tags.
fn skeleton(chapter: &Chapter) -> String {
    let mut body = MarkupNode::new("body");
    for paragraph in &chapter.paragraphs {
        let mut node = MarkupNode::new(paragraph.kind.skeleton_tag());
        let text = if paragraph.translated.is_empty() {
            &paragraph.content
        } else {
            &paragraph.translated
        };
        node.set_text(text);
        body.children.push(MarkupChild::Element(node));
    }

    let mut title = MarkupNode::new("title");
    title.set_text(&chapter.title);
    let mut head = MarkupNode::new("head");
    head.children.push(MarkupChild::Element(title));

    let mut html = MarkupNode::new("html");
    html.attributes
        .push(("xmlns".to_string(), "http://www.w3.org/1999/xhtml".to_string()));
    html.children.push(MarkupChild::Element(head));
    html.children.push(MarkupChild::Element(body));

    let tree = MarkupTree {
        children: vec![
            MarkupChild::Raw("<?xml version=\"1.0\" encoding=\"utf-8\"?>".to_string()),
            MarkupChild::Element(html),
        ],
    };
    markup::serialize(&tree)
}
