//! Graft DOM - arena document tree
//!
//! Memory-efficient DOM used by the exchange engine. Nodes live in a
//! flat arena and reference each other through `NodeId` indices, so the
//! engine can keep plain ids in its bookkeeping tables without fighting
//! the borrow checker over node references.

mod node;
mod tree;
mod select;
mod geometry;
pub mod forms;
pub mod validation;

pub use node::{Attribute, ElementData, FileAttachment, FormState, Node, NodeData};
pub use tree::{DomError, DomResult, DomTree};
pub use select::{closest, query_all, query_first, Selector, SelectorError};
pub use geometry::Rect;

/// Node identifier (index into the tree arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel for "no node" (avoids Option in the hot node struct)
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// The document root
    pub const ROOT: NodeId = NodeId(0);

    /// Check whether this id is the NONE sentinel
    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Check whether this id refers to a node
    #[inline]
    pub fn is_some(self) -> bool {
        self != Self::NONE
    }
}
