//! Observable signals
//!
//! Everything the engine wants the host (or a test) to see is reported
//! as a signal on the relevant element: error taxonomy, lifecycle
//! checkpoints, and events requested by response headers. Signals for
//! elements that have left the tree are re-targeted at the document
//! root so they are never lost.

use graft_dom::{DomTree, NodeId};

/// What a signal reports
#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// Malformed trigger/selector clause; the clause was skipped
    SyntaxError { detail: String },
    /// A selector resolved to nothing
    TargetNotFound { selector: String },
    /// Constraint validation failed; the request was never sent
    ValidationHalt { control: NodeId },
    /// Network error/timeout; no swap happened
    TransportFailure { detail: String },
    /// Status classified as a logical error by the rule table
    ResponseError { status: u16 },
    /// Fragment parse/insert failed; fatal for that one exchange only
    SwapFailure { detail: String },
    /// A user-supplied trigger guard raised an error (treated as pass)
    GuardFailure { guard: String, detail: String },

    /// Request is about to leave the engine
    BeforeSend,
    /// The exchange finished (any outcome)
    AfterRequest,
    /// The exchange was aborted
    Abort,
    /// The exchange timed out
    Timeout,
    /// Primary swap completed
    AfterSwap,
    /// Settle phase completed
    AfterSettle,
    /// Fired on newly inserted content during settle
    Load,

    /// Response asked for a full navigation; no swap was done
    Redirect { url: String },
    /// Response asked for a full page reload
    Refresh,
    /// A new history entry was recorded
    UrlPushed { url: String },
    /// The current history entry was replaced
    UrlReplaced { url: String },
    /// A snapshot was replayed for instant navigation
    HistoryRestored { url: String },
    /// Scroll request from a swap directive or a snapshot restore
    Scroll { to: ScrollTo },

    /// Named event requested by a response header or a response rule
    Custom { name: String },
}

/// Scroll destination
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTo {
    Top,
    Bottom,
    Offset(f64),
}

/// One signal, targeted at an element
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub target: NodeId,
}

/// Engine-owned signal buffer; the host drains it after each call
#[derive(Debug, Default)]
pub struct SignalLog {
    signals: Vec<Signal>,
}

impl SignalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signal, re-targeting to the document root when the
    /// element has already left the tree
    pub fn emit(&mut self, tree: &DomTree, target: NodeId, kind: SignalKind) {
        let target = if tree.is_attached(target) {
            target
        } else {
            NodeId::ROOT
        };
        match &kind {
            SignalKind::SyntaxError { detail } => {
                tracing::warn!(target: "graft", node = target.0, %detail, "trigger syntax error")
            }
            SignalKind::TargetNotFound { selector } => {
                tracing::warn!(target: "graft", node = target.0, %selector, "target not found")
            }
            SignalKind::TransportFailure { detail } => {
                tracing::warn!(target: "graft", node = target.0, %detail, "transport failure")
            }
            SignalKind::SwapFailure { detail } => {
                tracing::warn!(target: "graft", node = target.0, %detail, "swap failure")
            }
            _ => tracing::trace!(target: "graft", node = target.0, "signal"),
        }
        self.signals.push(Signal { kind, target });
    }

    /// Take all buffered signals
    pub fn drain(&mut self) -> Vec<Signal> {
        std::mem::take(&mut self.signals)
    }

    /// Peek at buffered signals without draining
    pub fn pending(&self) -> &[Signal] {
        &self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retarget_detached_to_root() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        tree.append_child(NodeId::ROOT, div).unwrap();

        let mut log = SignalLog::new();
        log.emit(&tree, div, SignalKind::AfterSwap);
        assert_eq!(log.pending()[0].target, div);

        tree.detach(div).unwrap();
        log.emit(&tree, div, SignalKind::AfterSettle);
        assert_eq!(log.pending()[1].target, NodeId::ROOT);
    }

    #[test]
    fn test_drain() {
        let tree = DomTree::new();
        let mut log = SignalLog::new();
        log.emit(&tree, NodeId::ROOT, SignalKind::Refresh);
        assert_eq!(log.drain().len(), 1);
        assert!(log.pending().is_empty());
    }
}
