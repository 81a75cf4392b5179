//! Target references
//!
//! Where a response fragment lands is described by a small tagged union
//! rather than a raw selector string, so resolution is explicit about
//! which search it performs (self, upward, downward, global).

use graft_dom::{closest, query_first, DomTree, NodeId, Selector, SelectorError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("no element matches `{0}`")]
    NotFound(String),
    #[error("bad selector: {0}")]
    BadSelector(#[from] SelectorError),
}

/// Parsed form of a target expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// The initiating element itself
    This,
    /// First match in the whole document
    Css(String),
    /// Nearest ancestor-or-self match
    Closest(String),
    /// First match among the element's own descendants
    Find(String),
    /// The document root
    Document,
    /// Alias for the document root in a headless tree
    Window,
}

impl TargetRef {
    /// Parse a target expression such as `closest tr` or `#result`
    pub fn parse(raw: &str) -> TargetRef {
        let raw = raw.trim();
        if raw == "this" {
            TargetRef::This
        } else if raw == "document" {
            TargetRef::Document
        } else if raw == "window" {
            TargetRef::Window
        } else if let Some(rest) = raw.strip_prefix("closest ") {
            TargetRef::Closest(rest.trim().to_string())
        } else if let Some(rest) = raw.strip_prefix("find ") {
            TargetRef::Find(rest.trim().to_string())
        } else {
            TargetRef::Css(raw.to_string())
        }
    }

    /// Resolve against the tree, relative to `base`
    pub fn resolve(&self, tree: &DomTree, base: NodeId) -> Result<NodeId, TargetError> {
        match self {
            TargetRef::This => Ok(base),
            TargetRef::Document | TargetRef::Window => Ok(NodeId::ROOT),
            TargetRef::Css(sel) => {
                let selector = Selector::parse(sel)?;
                query_first(tree, NodeId::ROOT, &selector)
                    .ok_or_else(|| TargetError::NotFound(sel.clone()))
            }
            TargetRef::Closest(sel) => {
                let selector = Selector::parse(sel)?;
                closest(tree, base, &selector).ok_or_else(|| TargetError::NotFound(sel.clone()))
            }
            TargetRef::Find(sel) => {
                let selector = Selector::parse(sel)?;
                query_first(tree, base, &selector)
                    .ok_or_else(|| TargetError::NotFound(sel.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let table = tree.create_element("table");
        let row = tree.create_element("tr");
        let cell = tree.create_element("td");
        tree.element_mut(cell).unwrap().set_attr("id", "cell");
        tree.append_child(NodeId::ROOT, table).unwrap();
        tree.append_child(table, row).unwrap();
        tree.append_child(row, cell).unwrap();
        (tree, row, cell)
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(TargetRef::parse("this"), TargetRef::This);
        assert_eq!(
            TargetRef::parse("closest tr"),
            TargetRef::Closest("tr".to_string())
        );
        assert_eq!(
            TargetRef::parse("find .x"),
            TargetRef::Find(".x".to_string())
        );
        assert_eq!(TargetRef::parse("#out"), TargetRef::Css("#out".to_string()));
    }

    #[test]
    fn test_resolve() {
        let (tree, row, cell) = sample();
        assert_eq!(TargetRef::This.resolve(&tree, cell).unwrap(), cell);
        assert_eq!(
            TargetRef::Closest("table".to_string())
                .resolve(&tree, cell)
                .unwrap()
                .0,
            1
        );
        assert_eq!(
            TargetRef::Find("td".to_string()).resolve(&tree, row).unwrap(),
            cell
        );
        assert_eq!(
            TargetRef::Css("#cell".to_string())
                .resolve(&tree, NodeId::ROOT)
                .unwrap(),
            cell
        );
    }

    #[test]
    fn test_resolve_missing_is_error() {
        let (tree, _, cell) = sample();
        let err = TargetRef::Css("#nope".to_string()).resolve(&tree, cell);
        assert!(matches!(err, Err(TargetError::NotFound(_))));
    }
}
