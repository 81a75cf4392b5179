//! HTML serialization
//!
//! Turns a subtree back into markup. The history store snapshots page
//! content this way; the output favors round-tripping through the
//! parser over byte-for-byte fidelity with the source document.

use graft_dom::{DomTree, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Serialize a node and its subtree (outer HTML)
pub fn outer_html(tree: &DomTree, id: NodeId) -> String {
    let mut out = String::new();
    write_node(tree, id, &mut out);
    out
}

/// Serialize a node's children (inner HTML)
pub fn inner_html(tree: &DomTree, id: NodeId) -> String {
    let mut out = String::new();
    for child in tree.children(id) {
        write_node(tree, child, &mut out);
    }
    out
}

fn write_node(tree: &DomTree, id: NodeId, out: &mut String) {
    let node = match tree.get(id) {
        Some(n) => n,
        None => return,
    };
    match &node.data {
        NodeData::Document => {
            for child in tree.children(id) {
                write_node(tree, child, out);
            }
        }
        NodeData::Text(text) => out.push_str(&escape_text(text)),
        NodeData::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeData::Element(elem) => {
            out.push('<');
            out.push_str(&elem.tag);
            for attr in &elem.attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&escape_attr(&attr.value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&elem.tag.as_str()) {
                return;
            }
            for child in tree.children(id) {
                write_node(tree, child, out);
            }
            out.push_str("</");
            out.push_str(&elem.tag);
            out.push('>');
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HtmlParser;

    #[test]
    fn test_outer_html() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        tree.set_attr(div, "id", "main");
        let text = tree.create_text("a < b");
        tree.append_child(div, text).unwrap();
        tree.append_child(NodeId::ROOT, div).unwrap();

        assert_eq!(outer_html(&tree, div), "<div id=\"main\">a &lt; b</div>");
    }

    #[test]
    fn test_void_element() {
        let mut tree = DomTree::new();
        let input = tree.create_element("input");
        tree.set_attr(input, "name", "q");
        tree.append_child(NodeId::ROOT, input).unwrap();

        assert_eq!(outer_html(&tree, input), "<input name=\"q\">");
    }

    #[test]
    fn test_round_trip() {
        let markup = "<section id=\"content\"><p>Hello</p><input name=\"q\"></section>";
        let fragment = HtmlParser::new().parse_fragment(markup);
        assert_eq!(inner_html(&fragment.tree, NodeId::ROOT), markup);
    }
}
