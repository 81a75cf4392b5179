//! HTML5 parser
//!
//! Uses html5ever's built-in RcDom and converts to the graft-dom format.
//! This is simpler and more reliable than implementing TreeSink directly.

use graft_dom::{DomTree, NodeId};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// HTML5 parser
#[derive(Debug, Default)]
pub struct HtmlParser;

/// A parsed response fragment: the content tree plus a title, if the
/// markup carried one
#[derive(Debug)]
pub struct Fragment {
    /// Content nodes attached under the tree's document root
    pub tree: DomTree,
    /// Text of the first `<title>` element found anywhere in the markup
    pub title: Option<String>,
}

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a complete HTML document
    pub fn parse_document(&self, html: &str) -> DomTree {
        let dom = self.parse_rcdom(html);
        let mut tree = DomTree::new();
        convert_children(&dom.document, &mut tree, NodeId::ROOT);
        tracing::debug!(nodes = tree.len(), "parsed HTML document");
        tree
    }

    /// Parse response markup as a fragment
    ///
    /// html5ever wraps everything in html/head/body; the body's children
    /// become the fragment content, and a title found anywhere in the
    /// markup (head included) is surfaced separately.
    pub fn parse_fragment(&self, html: &str) -> Fragment {
        let full = self.parse_document(html);
        let title = extract_title(&full);

        let mut tree = DomTree::new();
        if let Some(body) = find_tag(&full, "body") {
            let children: Vec<NodeId> = full.children(body).collect();
            for child in children {
                if let Ok(copied) = tree.import(&full, child) {
                    // freshly imported nodes are detached, append cannot fail
                    let _ = tree.append_child(NodeId::ROOT, copied);
                }
            }
        }
        tracing::debug!(nodes = tree.len(), has_title = title.is_some(), "parsed fragment");
        Fragment { tree, title }
    }

    fn parse_rcdom(&self, html: &str) -> RcDom {
        parse_document(RcDom::default(), Default::default())
            .from_utf8()
            .read_from(&mut html.as_bytes())
            .expect("reading from an in-memory buffer cannot fail")
    }
}

fn find_tag(tree: &DomTree, tag: &str) -> Option<NodeId> {
    tree.descendants(NodeId::ROOT).find(|&n| tree.tag(n) == Some(tag))
}

fn extract_title(tree: &DomTree) -> Option<String> {
    find_tag(tree, "title").map(|t| tree.text_content(t).trim().to_string())
}

fn convert_children(handle: &Handle, tree: &mut DomTree, parent: NodeId) {
    for child in handle.children.borrow().iter() {
        convert_node(child, tree, parent);
    }
}

/// Convert one RcDom node into the arena tree
fn convert_node(handle: &Handle, tree: &mut DomTree, parent: NodeId) {
    match &handle.data {
        RcNodeData::Document => {
            convert_children(handle, tree, parent);
        }
        RcNodeData::Text { contents } => {
            let text = contents.borrow().to_string();
            if !text.trim().is_empty() {
                let id = tree.create_text(&text);
                let _ = tree.append_child(parent, id);
            }
        }
        RcNodeData::Comment { contents } => {
            let id = tree.create_comment(&contents.to_string());
            let _ = tree.append_child(parent, id);
        }
        RcNodeData::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            let id = tree.create_element(&name.local);
            for attr in attrs.borrow().iter() {
                tree.set_attr(id, &attr.name.local, &attr.value);
            }
            let _ = tree.append_child(parent, id);

            // template children live in template_contents, not children
            if let Some(contents) = template_contents.borrow().as_ref() {
                convert_children(contents, tree, id);
            }
            convert_children(handle, tree, id);
        }
        // doctype and processing instructions carry nothing the
        // exchange engine consumes
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
        let tree = HtmlParser::new().parse_document(html);
        assert!(tree.len() > 1, "expected more than 1 node, got {}", tree.len());
        assert!(find_tag(&tree, "p").is_some());
    }

    #[test]
    fn test_parse_fragment() {
        let fragment = HtmlParser::new().parse_fragment("<div id=\"a\">x</div><span>y</span>");
        let roots: Vec<_> = fragment.tree.children(NodeId::ROOT).collect();
        assert_eq!(roots.len(), 2);
        assert_eq!(fragment.tree.tag(roots[0]), Some("div"));
        assert_eq!(fragment.tree.attr(roots[0], "id"), Some("a"));
        assert_eq!(fragment.tree.tag(roots[1]), Some("span"));
        assert!(fragment.title.is_none());
    }

    #[test]
    fn test_fragment_title() {
        let fragment = HtmlParser::new().parse_fragment("<title>New Title</title><div>c</div>");
        assert_eq!(fragment.title.as_deref(), Some("New Title"));
        let roots: Vec<_> = fragment.tree.children(NodeId::ROOT).collect();
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn test_template_contents_converted() {
        let fragment = HtmlParser::new().parse_fragment("<template><div id=\"t\">x</div></template>");
        let roots: Vec<_> = fragment.tree.children(NodeId::ROOT).collect();
        assert_eq!(fragment.tree.tag(roots[0]), Some("template"));
        let inner: Vec<_> = fragment.tree.children(roots[0]).collect();
        assert_eq!(fragment.tree.attr(inner[0], "id"), Some("t"));
    }
}
