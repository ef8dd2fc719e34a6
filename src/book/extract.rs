/*!
 * Paragraph extraction from chapter markup.
 *
 * Given a chapter's raw markup this module isolates the translatable text
 * nodes, records each one's structural address and surrounding attributes,
 * and returns them as ordered [`Paragraph`]s. Extraction is a pure function
 * of the input markup: running it twice over the same markup yields the same
 * addresses, which is what lets the reconstructor find the nodes again.
 */

use std::collections::HashMap;

use crate::book::markup::{self, MarkupChild, MarkupNode};
use crate::book::model::{Paragraph, ParagraphKind};

/// Element names extracted directly when they hold text.
const LEAF_NAMES: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "blockquote", "pre", "li", "dt", "dd", "td", "th",
    "caption", "figcaption",
];

/// Container names extracted only when they hold direct, non-nested text.
const CONTAINER_NAMES: &[&str] = &["div", "section", "article", "aside"];

fn is_leaf_name(name: &str) -> bool {
    LEAF_NAMES.iter().any(|n| name.eq_ignore_ascii_case(n))
}

fn is_container_name(name: &str) -> bool {
    CONTAINER_NAMES.iter().any(|n| name.eq_ignore_ascii_case(n))
}

fn is_block_name(name: &str) -> bool {
    is_leaf_name(name) || is_container_name(name) || name.eq_ignore_ascii_case("table")
        || name.eq_ignore_ascii_case("ul")
        || name.eq_ignore_ascii_case("ol")
        || name.eq_ignore_ascii_case("dl")
        || name.eq_ignore_ascii_case("figure")
        || name.eq_ignore_ascii_case("tr")
}

/// Extract ordered paragraphs from chapter markup.
///
/// Whitespace-only nodes are skipped. A chapter yielding zero paragraphs is
/// not an error here; document-level validation surfaces it.
pub fn extract_paragraphs(raw_markup: &str) -> Vec<Paragraph> {
    let tree = markup::parse(raw_markup);
    let mut paragraphs = Vec::new();
    walk_children(&tree.children, "", &mut paragraphs);
    paragraphs
}

fn walk_children(children: &[MarkupChild], prefix: &str, out: &mut Vec<Paragraph>) {
    let mut ordinals: HashMap<String, usize> = HashMap::new();
    for child in children {
        let MarkupChild::Element(node) = child else {
            continue;
        };
        let key = node.name.to_ascii_lowercase();
        let ordinal = *ordinals
            .entry(key.clone())
            .and_modify(|o| *o += 1)
            .or_insert(0);
        let address = format!("{}/{}[{}]", prefix, key, ordinal);

        if is_translatable(node) {
            let content = node.text_content().trim().to_string();
            if !content.is_empty() {
                out.push(Paragraph {
                    id: format!("p{:04}", out.len()),
                    content,
                    translated: String::new(),
                    kind: ParagraphKind::from_element(&key),
                    address: address.clone(),
                    attributes: node.attributes.clone(),
                    raw_fragment: markup::serialize_fragment(node),
                });
                // A matched node owns all of its inline content; nothing
                // inside it is extracted separately.
                continue;
            }
        }
        walk_children(&node.children, &address, out);
    }
}

/// Decide whether a node is itself the unit of translation.
///
/// Leaf elements qualify unless they wrap further block structure (a
/// blockquote of `<p>`s yields the inner paragraphs instead). Generic
/// containers qualify only with direct, non-nested text.
fn is_translatable(node: &MarkupNode) -> bool {
    if node.has_element_child(is_block_name) {
        return false;
    }
    if is_leaf_name(&node.name) {
        return true;
    }
    is_container_name(&node.name) && node.has_direct_text()
}
