/*!
 * Lenient markup tree parsing and strict-XML serialization.
 *
 * Chapter files inside an EPUB container are nominally XHTML but are often
 * written as lenient HTML: unclosed void elements, stray end tags, mismatched
 * nesting. This module parses such markup best-effort into a lightweight
 * element tree and serializes it back as strictly well-formed XML, because
 * the container format requires it: void elements are emitted self-closed and
 * every non-void element is explicitly closed.
 */

use quick_xml::Reader;
use quick_xml::events::Event;

/// Element names that must be emitted self-closed and never carry children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Check whether an element name is a void element (case-insensitive).
pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| name.eq_ignore_ascii_case(v))
}

/// A child slot inside an element or at the document top level.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupChild {
    /// A nested element
    Element(MarkupNode),
    /// Unescaped character data
    Text(String),
    /// A comment, stored without the `<!-- -->` delimiters
    Comment(String),
    /// Prolog material re-emitted verbatim (XML declaration, doctype, PIs)
    Raw(String),
}

/// One element of the markup tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupNode {
    /// Element name as written in the source
    pub name: String,
    /// Attributes in source order
    pub attributes: Vec<(String, String)>,
    /// Ordered children
    pub children: Vec<MarkupChild>,
}

impl MarkupNode {
    /// Create an element with no attributes or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), children: Vec::new() }
    }

    /// Concatenated text of this node and all descendants, tags stripped.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Whether the node has a non-whitespace text child of its own.
    pub fn has_direct_text(&self) -> bool {
        self.children
            .iter()
            .any(|c| matches!(c, MarkupChild::Text(t) if !t.trim().is_empty()))
    }

    /// Whether any direct child is an element with the given predicate.
    pub fn has_element_child(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.children.iter().any(|c| match c {
            MarkupChild::Element(e) => pred(&e.name),
            _ => false,
        })
    }

    /// Replace all children with a single text child.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![MarkupChild::Text(text.to_string())];
    }
}

fn collect_text(children: &[MarkupChild], out: &mut String) {
    for child in children {
        match child {
            MarkupChild::Text(t) => out.push_str(t),
            MarkupChild::Element(e) => collect_text(&e.children, out),
            _ => {}
        }
    }
}

/// A parsed markup document: the ordered top-level children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkupTree {
    /// Top-level children (prolog material, comments, the root element)
    pub children: Vec<MarkupChild>,
}

impl MarkupTree {
    /// The first top-level element, usually `<html>`.
    pub fn root(&self) -> Option<&MarkupNode> {
        self.children.iter().find_map(|c| match c {
            MarkupChild::Element(e) => Some(e),
            _ => None,
        })
    }
}

/// Parse markup into a tree, best-effort.
///
/// Never fails: unclosed elements are closed at end of input, end tags
/// without a matching start are dropped, and void elements written in HTML
/// style (`<br>`) are treated as self-contained. Malformed trailing input is
/// kept as text.
pub fn parse(markup: &str) -> MarkupTree {
    let mut reader = Reader::from_str(markup);
    {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    let mut tree = MarkupTree::default();
    // Stack of elements currently open. Children attach to the top, or to
    // the tree itself when the stack is empty.
    let mut stack: Vec<MarkupNode> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attributes = read_attributes(&e);
                let node = MarkupNode { name: name.clone(), attributes, children: Vec::new() };
                if is_void_element(&name) {
                    // HTML-style void start tag with no matching end.
                    attach(&mut stack, &mut tree, MarkupChild::Element(node));
                } else {
                    stack.push(node);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let attributes = read_attributes(&e);
                let node = MarkupNode { name, attributes, children: Vec::new() };
                attach(&mut stack, &mut tree, MarkupChild::Element(node));
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if is_void_element(&name) {
                    // HTML-style `</br>` noise.
                    continue;
                }
                close_element(&mut stack, &mut tree, &name);
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map(|t| t.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                if !text.is_empty() {
                    attach(&mut stack, &mut tree, MarkupChild::Text(text));
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                attach(&mut stack, &mut tree, MarkupChild::Text(text));
            }
            Ok(Event::Comment(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                attach(&mut stack, &mut tree, MarkupChild::Comment(text));
            }
            Ok(Event::Decl(e)) => {
                let raw = format!("<?{}?>", String::from_utf8_lossy(&e));
                attach(&mut stack, &mut tree, MarkupChild::Raw(raw));
            }
            Ok(Event::DocType(e)) => {
                let raw = format!("<!DOCTYPE {}>", String::from_utf8_lossy(&e).trim());
                attach(&mut stack, &mut tree, MarkupChild::Raw(raw));
            }
            Ok(Event::PI(e)) => {
                let raw = format!("<?{}?>", String::from_utf8_lossy(&e));
                attach(&mut stack, &mut tree, MarkupChild::Raw(raw));
            }
            Err(_) => break,
        }
    }

    // Close whatever remained open at end of input.
    while let Some(node) = stack.pop() {
        attach(&mut stack, &mut tree, MarkupChild::Element(node));
    }

    tree
}

fn read_attributes(e: &quick_xml::events::BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect()
}

fn attach(stack: &mut Vec<MarkupNode>, tree: &mut MarkupTree, child: MarkupChild) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(child),
        None => tree.children.push(child),
    }
}

fn close_element(stack: &mut Vec<MarkupNode>, tree: &mut MarkupTree, name: &str) {
    let position = stack.iter().rposition(|n| n.name.eq_ignore_ascii_case(name));
    match position {
        Some(idx) => {
            // Close intermediate unclosed elements first, then the match.
            while stack.len() > idx + 1 {
                let node = stack.pop().unwrap_or_else(|| MarkupNode::new(""));
                attach(stack, tree, MarkupChild::Element(node));
            }
            if let Some(node) = stack.pop() {
                attach(stack, tree, MarkupChild::Element(node));
            }
        }
        // End tag with no matching start: drop it.
        None => {}
    }
}

/// Serialize a tree as strictly well-formed XML.
pub fn serialize(tree: &MarkupTree) -> String {
    let mut out = String::new();
    for child in &tree.children {
        serialize_child(child, &mut out);
    }
    out
}

fn serialize_child(child: &MarkupChild, out: &mut String) {
    match child {
        MarkupChild::Text(t) => out.push_str(&escape_text(t)),
        MarkupChild::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        MarkupChild::Raw(r) => {
            out.push_str(r);
            out.push('\n');
        }
        MarkupChild::Element(e) => serialize_node(e, out),
    }
}

/// Serialize a single element subtree.
pub fn serialize_fragment(node: &MarkupNode) -> String {
    let mut out = String::new();
    serialize_node(node, &mut out);
    out
}

fn serialize_node(node: &MarkupNode, out: &mut String) {
    out.push('<');
    out.push_str(&node.name);
    for (key, value) in &node.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attribute(value));
        out.push('"');
    }
    if is_void_element(&node.name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &node.children {
        serialize_child(child, out);
    }
    out.push_str("</");
    out.push_str(&node.name);
    out.push('>');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

/// Resolve a structural address like `/html[0]/body[0]/p[3]` to a node.
///
/// The ordinal counts same-named element siblings under the same parent, so
/// the address is deterministic across re-parses of identical markup.
pub fn resolve<'a>(tree: &'a MarkupTree, address: &str) -> Option<&'a MarkupNode> {
    let mut current: &[MarkupChild] = &tree.children;
    let mut node: Option<&MarkupNode> = None;
    for segment in address.split('/').filter(|s| !s.is_empty()) {
        let (name, ordinal) = parse_segment(segment)?;
        let found = nth_named_element(current, name, ordinal)?;
        current = &found.children;
        node = Some(found);
    }
    node
}

/// Mutable variant of [`resolve`].
pub fn resolve_mut<'a>(tree: &'a mut MarkupTree, address: &str) -> Option<&'a mut MarkupNode> {
    let segments: Option<Vec<(&str, usize)>> =
        address.split('/').filter(|s| !s.is_empty()).map(parse_segment).collect();
    resolve_segments_mut(&mut tree.children, &segments?)
}

fn resolve_segments_mut<'a>(
    children: &'a mut Vec<MarkupChild>,
    segments: &[(&str, usize)],
) -> Option<&'a mut MarkupNode> {
    let ((name, ordinal), rest) = segments.split_first()?;
    let idx = nth_named_index(children, name, *ordinal)?;
    let MarkupChild::Element(node) = &mut children[idx] else {
        return None;
    };
    if rest.is_empty() { Some(node) } else { resolve_segments_mut(&mut node.children, rest) }
}

/// Find the first element whose trimmed text content equals `text`.
///
/// Fallback lookup for when an address no longer resolves, e.g. because the
/// tree was re-parsed from repaired markup.
pub fn find_by_text_mut<'a>(tree: &'a mut MarkupTree, text: &str) -> Option<&'a mut MarkupNode> {
    find_in_children_mut(&mut tree.children, text)
}

fn find_in_children_mut<'a>(
    children: &'a mut Vec<MarkupChild>,
    text: &str,
) -> Option<&'a mut MarkupNode> {
    for child in children.iter_mut() {
        if let MarkupChild::Element(node) = child {
            if node.text_content().trim() == text {
                return Some(node);
            }
            if let Some(found) = find_in_children_mut(&mut node.children, text) {
                return Some(found);
            }
        }
    }
    None
}

fn parse_segment(segment: &str) -> Option<(&str, usize)> {
    let open = segment.find('[')?;
    let close = segment.rfind(']')?;
    if close <= open + 1 {
        return None;
    }
    let name = &segment[..open];
    let ordinal: usize = segment[open + 1..close].parse().ok()?;
    Some((name, ordinal))
}

fn nth_named_element<'a>(
    children: &'a [MarkupChild],
    name: &str,
    ordinal: usize,
) -> Option<&'a MarkupNode> {
    children
        .iter()
        .filter_map(|c| match c {
            MarkupChild::Element(e) if e.name.eq_ignore_ascii_case(name) => Some(e),
            _ => None,
        })
        .nth(ordinal)
}

fn nth_named_index(children: &[MarkupChild], name: &str, ordinal: usize) -> Option<usize> {
    let mut seen = 0usize;
    for (i, child) in children.iter().enumerate() {
        if let MarkupChild::Element(e) = child {
            if e.name.eq_ignore_ascii_case(name) {
                if seen == ordinal {
                    return Some(i);
                }
                seen += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_should_build_nested_tree() {
        let tree = parse("<html><body><p>Hello <em>world</em></p></body></html>");
        let root = tree.root().expect("root element");
        assert_eq!(root.name, "html");
        let node = resolve(&tree, "/html[0]/body[0]/p[0]").expect("p node");
        assert_eq!(node.text_content(), "Hello world");
    }

    #[test]
    fn test_parse_should_tolerate_html_void_elements() {
        let tree = parse("<body><p>one<br>two</p><hr><p>three</p></body>");
        let first = resolve(&tree, "/body[0]/p[0]").expect("first p");
        assert_eq!(first.text_content(), "onetwo");
        let second = resolve(&tree, "/body[0]/p[1]").expect("second p");
        assert_eq!(second.text_content(), "three");
    }

    #[test]
    fn test_parse_should_drop_unmatched_end_tags() {
        let tree = parse("<body><p>text</p></div></body>");
        assert!(resolve(&tree, "/body[0]/p[0]").is_some());
    }

    #[test]
    fn test_serialize_should_self_close_void_elements() {
        let tree = parse("<body><p>a<br>b</p><img src=\"x.png\"></body>");
        let xml = serialize(&tree);
        assert!(xml.contains("<br/>"), "got: {}", xml);
        assert!(xml.contains("<img src=\"x.png\"/>"), "got: {}", xml);
        assert!(xml.contains("</p>"));
        assert!(xml.contains("</body>"));
    }

    #[test]
    fn test_serialize_should_escape_text_and_attributes() {
        let mut node = MarkupNode::new("p");
        node.attributes.push(("title".to_string(), "a\"b<c".to_string()));
        node.set_text("x < y & z");
        let tree = MarkupTree { children: vec![MarkupChild::Element(node)] };
        let xml = serialize(&tree);
        assert_eq!(xml, "<p title=\"a&quot;b&lt;c\">x &lt; y &amp; z</p>");
    }

    #[test]
    fn test_resolve_should_use_per_name_ordinals() {
        let tree = parse("<body><div>a</div><p>b</p><div>c</div></body>");
        let second_div = resolve(&tree, "/body[0]/div[1]").expect("second div");
        assert_eq!(second_div.text_content(), "c");
    }

    #[test]
    fn test_resolve_mut_should_allow_in_place_replacement() {
        let mut tree = parse("<body><p>old</p></body>");
        let node = resolve_mut(&mut tree, "/body[0]/p[0]").expect("p node");
        node.set_text("new");
        assert!(serialize(&tree).contains("<p>new</p>"));
    }

    #[test]
    fn test_find_by_text_should_match_trimmed_content() {
        let mut tree = parse("<body><div><p>  needle  </p></div></body>");
        let node = find_by_text_mut(&mut tree, "needle").expect("found");
        assert_eq!(node.name, "p");
    }

    #[test]
    fn test_parse_should_keep_doctype_and_declaration() {
        let input = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<!DOCTYPE html>\n<html><body/></html>";
        let xml = serialize(&parse(input));
        assert!(xml.contains("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<!DOCTYPE html>"));
    }
}
