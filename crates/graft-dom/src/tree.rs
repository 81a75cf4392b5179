//! DOM tree (arena-based allocation)
//!
//! All nodes live in one `Vec`; structural links are `NodeId` indices.
//! Detached nodes stay in the arena until the tree is dropped, which is
//! fine for the exchange engine's page-lifetime usage pattern.

use crate::node::{ElementData, Node, NodeData};
use crate::NodeId;

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// Node not found in the arena
    #[error("node not found")]
    NotFound,
    /// Hierarchy error (e.g., inserting a node into its own subtree)
    #[error("hierarchy request error")]
    HierarchyRequest,
    /// Reference node is not a child of the given parent
    #[error("node is not a child of the given parent")]
    NotAChild,
}

/// Arena-based DOM tree
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Create a new tree holding only the document root
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::document()],
        }
    }

    /// Number of nodes in the arena (including detached ones)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The arena always holds at least the document root
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Get a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    /// Get a mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.get(id).ok_or(DomError::NotFound)
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Create a detached element node
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(Node::element(tag))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.alloc(Node::text(content.to_string()))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, content: &str) -> NodeId {
        self.alloc(Node::comment(content.to_string()))
    }

    /// Element data for an element node
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(|n| n.as_element())
    }

    /// Mutable element data for an element node
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(|n| n.as_element_mut())
    }

    /// Tag name of an element node
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    /// Attribute value on an element node
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    /// Set an attribute on an element node (no-op on non-elements)
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(e) = self.element_mut(id) {
            e.set_attr(name, value);
        }
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(|p| p.is_some())
    }

    /// First child of a node
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.first_child).filter(|c| c.is_some())
    }

    /// Next sibling of a node
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.next_sibling).filter(|s| s.is_some())
    }

    /// Previous sibling of a node
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.prev_sibling).filter(|s| s.is_some())
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut at = node;
        while at.is_some() {
            if at == ancestor {
                return true;
            }
            at = match self.get(at) {
                Some(n) => n.parent,
                None => NodeId::NONE,
            };
        }
        false
    }

    /// Check whether a node is reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.get(id).is_some() && self.is_ancestor_or_self(NodeId::ROOT, id)
    }

    /// Unlink a node from its parent; the subtree below it stays intact
    pub fn detach(&mut self, id: NodeId) -> DomResult<()> {
        let (parent, prev, next) = {
            let n = self.node(id)?;
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        if parent.is_none() {
            return Ok(());
        }
        if prev.is_some() {
            self.nodes[prev.0 as usize].next_sibling = next;
        } else {
            self.nodes[parent.0 as usize].first_child = next;
        }
        if next.is_some() {
            self.nodes[next.0 as usize].prev_sibling = prev;
        } else {
            self.nodes[parent.0 as usize].last_child = prev;
        }
        let n = &mut self.nodes[id.0 as usize];
        n.parent = NodeId::NONE;
        n.prev_sibling = NodeId::NONE;
        n.next_sibling = NodeId::NONE;
        Ok(())
    }

    /// Append a child as the last child of a parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.node(parent)?;
        self.node(child)?;
        if child == NodeId::ROOT || self.is_ancestor_or_self(child, parent) {
            return Err(DomError::HierarchyRequest);
        }
        self.detach(child)?;

        let last = self.nodes[parent.0 as usize].last_child;
        if last.is_some() {
            self.nodes[last.0 as usize].next_sibling = child;
        } else {
            self.nodes[parent.0 as usize].first_child = child;
        }
        let c = &mut self.nodes[child.0 as usize];
        c.parent = parent;
        c.prev_sibling = last;
        c.next_sibling = NodeId::NONE;
        self.nodes[parent.0 as usize].last_child = child;
        Ok(())
    }

    /// Insert a node before a reference child (or append when None)
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        ref_child: Option<NodeId>,
    ) -> DomResult<()> {
        let anchor = match ref_child {
            Some(r) => r,
            None => return self.append_child(parent, new_child),
        };
        self.node(parent)?;
        self.node(new_child)?;
        if self.node(anchor)?.parent != parent {
            return Err(DomError::NotAChild);
        }
        if new_child == NodeId::ROOT || self.is_ancestor_or_self(new_child, parent) {
            return Err(DomError::HierarchyRequest);
        }
        if new_child == anchor {
            return Ok(());
        }
        self.detach(new_child)?;

        let prev = self.nodes[anchor.0 as usize].prev_sibling;
        if prev.is_some() {
            self.nodes[prev.0 as usize].next_sibling = new_child;
        } else {
            self.nodes[parent.0 as usize].first_child = new_child;
        }
        self.nodes[anchor.0 as usize].prev_sibling = new_child;
        let c = &mut self.nodes[new_child.0 as usize];
        c.parent = parent;
        c.prev_sibling = prev;
        c.next_sibling = anchor;
        Ok(())
    }

    /// Children of a node, in document order
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.get(id).map(|n| n.first_child).unwrap_or(NodeId::NONE),
        }
    }

    /// All descendants of a node in document (preorder) order,
    /// excluding the node itself
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            root: id,
            next: self.get(id).map(|n| n.first_child).unwrap_or(NodeId::NONE),
        }
    }

    /// Strict ancestors of a node, nearest first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get(id).map(|n| n.parent).unwrap_or(NodeId::NONE),
        }
    }

    /// Find an attached element by its id attribute
    pub fn find_by_id(&self, id_value: &str) -> Option<NodeId> {
        self.descendants(NodeId::ROOT)
            .find(|&n| self.element(n).and_then(|e| e.id()) == Some(id_value))
    }

    /// Concatenated text of a node and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(t) = self.get(id).and_then(|n| n.as_text()) {
            out.push_str(t);
        }
        for d in self.descendants(id) {
            if let Some(t) = self.nodes[d.0 as usize].as_text() {
                out.push_str(t);
            }
        }
        out
    }

    /// Deep-copy a subtree from another tree into this arena;
    /// the copy is detached
    pub fn import(&mut self, other: &DomTree, node: NodeId) -> DomResult<NodeId> {
        let data = other.node(node)?.data.clone();
        let new_id = self.alloc(Node {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            data,
        });
        for child in other.children(node) {
            let copied = self.import(other, child)?;
            self.append_child(new_id, copied)?;
        }
        Ok(new_id)
    }
}

/// Iterator over a node's children
pub struct Children<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl<'a> Iterator for Children<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.next.is_none() {
            return None;
        }
        let cur = self.next;
        self.next = self.tree.nodes[cur.0 as usize].next_sibling;
        Some(cur)
    }
}

/// Preorder iterator over a subtree, excluding the start node
pub struct Descendants<'a> {
    tree: &'a DomTree,
    root: NodeId,
    next: NodeId,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.next.is_none() {
            return None;
        }
        let cur = self.next;
        let n = &self.tree.nodes[cur.0 as usize];
        if n.first_child.is_some() {
            self.next = n.first_child;
        } else {
            let mut at = cur;
            self.next = NodeId::NONE;
            loop {
                if at == self.root {
                    break;
                }
                let node = &self.tree.nodes[at.0 as usize];
                if node.next_sibling.is_some() {
                    self.next = node.next_sibling;
                    break;
                }
                if node.parent.is_none() {
                    break;
                }
                at = node.parent;
            }
        }
        Some(cur)
    }
}

/// Iterator over a node's ancestors, nearest first
pub struct Ancestors<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.next.is_none() {
            return None;
        }
        let cur = self.next;
        self.next = self.tree.nodes[cur.0 as usize].parent;
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let body = tree.create_element("body");
        tree.append_child(NodeId::ROOT, body).unwrap();
        let a = tree.create_element("div");
        let b = tree.create_element("span");
        tree.append_child(body, a).unwrap();
        tree.append_child(body, b).unwrap();
        (tree, body, a, b)
    }

    #[test]
    fn test_append_and_order() {
        let (tree, body, a, b) = sample();
        let kids: Vec<_> = tree.children(body).collect();
        assert_eq!(kids, vec![a, b]);
        assert_eq!(tree.parent(a), Some(body));
        assert_eq!(tree.next_sibling(a), Some(b));
        assert_eq!(tree.prev_sibling(b), Some(a));
    }

    #[test]
    fn test_insert_before() {
        let (mut tree, body, a, b) = sample();
        let c = tree.create_element("p");
        tree.insert_before(body, c, Some(b)).unwrap();
        let kids: Vec<_> = tree.children(body).collect();
        assert_eq!(kids, vec![a, c, b]);
    }

    #[test]
    fn test_detach() {
        let (mut tree, body, a, b) = sample();
        tree.detach(a).unwrap();
        let kids: Vec<_> = tree.children(body).collect();
        assert_eq!(kids, vec![b]);
        assert!(!tree.is_attached(a));
        assert!(tree.is_attached(b));
        // subtree of a stays intact
        assert_eq!(tree.parent(a), None);
    }

    #[test]
    fn test_hierarchy_error() {
        let (mut tree, body, a, _) = sample();
        assert_eq!(
            tree.append_child(a, body),
            Err(DomError::HierarchyRequest)
        );
    }

    #[test]
    fn test_find_by_id() {
        let (mut tree, _, a, _) = sample();
        tree.set_attr(a, "id", "main");
        assert_eq!(tree.find_by_id("main"), Some(a));
        assert_eq!(tree.find_by_id("missing"), None);

        // detached elements are not found
        tree.detach(a).unwrap();
        assert_eq!(tree.find_by_id("main"), None);
    }

    #[test]
    fn test_descendants_order() {
        let (mut tree, body, a, b) = sample();
        let inner = tree.create_element("em");
        tree.append_child(a, inner).unwrap();
        let all: Vec<_> = tree.descendants(body).collect();
        assert_eq!(all, vec![a, inner, b]);
    }

    #[test]
    fn test_text_content() {
        let (mut tree, _, a, _) = sample();
        let t1 = tree.create_text("Hello ");
        let t2 = tree.create_text("World");
        tree.append_child(a, t1).unwrap();
        tree.append_child(a, t2).unwrap();
        assert_eq!(tree.text_content(a), "Hello World");
    }

    #[test]
    fn test_import() {
        let (mut tree, body, _, _) = sample();
        let mut other = DomTree::new();
        let d = other.create_element("section");
        other.set_attr(d, "id", "copied");
        let t = other.create_text("content");
        other.append_child(d, t).unwrap();

        let copied = tree.import(&other, d).unwrap();
        tree.append_child(body, copied).unwrap();
        assert_eq!(tree.attr(copied, "id"), Some("copied"));
        assert_eq!(tree.text_content(copied), "content");
    }
}
