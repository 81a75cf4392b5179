//! Swap application
//!
//! Grafts a parsed response fragment into the live tree. The pipeline
//! runs in a fixed order: out-of-band children first, then the
//! reselect filter, then the preserve relocation, then the primary
//! insertion, with attribute merges collected for the settle phase.

use graft_dom::{DomTree, NodeId, Selector};
use graft_html::Fragment;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::registry::SwapExtensionRegistry;
use crate::signal::{ScrollTo, SignalKind, SignalLog};
use crate::trigger::parse_duration;

/// How content replaces or surrounds the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapStyle {
    /// Replace the target element itself
    ReplaceOuter,
    /// Replace the target's children
    ReplaceInner,
    /// Insert before the target element
    InsertBeforeBegin,
    /// Insert as the target's first children
    InsertAfterBegin,
    /// Insert as the target's last children
    InsertBeforeEnd,
    /// Insert after the target element
    InsertAfterEnd,
    /// Remove the target; the response body is ignored
    Delete,
    /// Process headers and out-of-band content only
    None,
    /// Defer to a registered extension
    Extension(String),
}

impl SwapStyle {
    /// Parse a style token; unknown tokens name an extension
    pub fn parse(raw: &str) -> SwapStyle {
        match raw {
            "innerHTML" | "inner" => SwapStyle::ReplaceInner,
            "outerHTML" | "outer" => SwapStyle::ReplaceOuter,
            "beforebegin" | "before" => SwapStyle::InsertBeforeBegin,
            "afterbegin" | "prepend" => SwapStyle::InsertAfterBegin,
            "beforeend" | "append" => SwapStyle::InsertBeforeEnd,
            "afterend" | "after" => SwapStyle::InsertAfterEnd,
            "delete" => SwapStyle::Delete,
            "none" => SwapStyle::None,
            other => SwapStyle::Extension(other.to_string()),
        }
    }
}

/// A full swap attribute: style plus timing and scroll modifiers
#[derive(Debug, Clone, PartialEq)]
pub struct SwapSpec {
    pub style: SwapStyle,
    pub swap_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub scroll: Option<ScrollTo>,
    /// Selector of an element to bring into view after settle
    pub show: Option<String>,
    /// Host hint to animate the change; the engine only carries it
    pub transition: bool,
    pub ignore_title: bool,
}

impl SwapSpec {
    pub fn from_style(style: SwapStyle) -> Self {
        SwapSpec {
            style,
            swap_delay_ms: None,
            settle_delay_ms: None,
            scroll: None,
            show: None,
            transition: false,
            ignore_title: false,
        }
    }

    /// Parse a swap attribute such as `innerHTML swap:100ms scroll:top`
    pub fn parse(raw: &str, issues: &mut Vec<String>) -> SwapSpec {
        let mut tokens = raw.split_whitespace();
        let style = match tokens.next() {
            Some(token) => SwapStyle::parse(token),
            None => SwapStyle::ReplaceInner,
        };
        let mut spec = SwapSpec::from_style(style);
        for token in tokens {
            if let Some(value) = token.strip_prefix("swap:") {
                match parse_duration(value) {
                    Some(ms) => spec.swap_delay_ms = Some(ms),
                    None => issues.push(format!("bad swap delay `{value}`")),
                }
            } else if let Some(value) = token.strip_prefix("settle:") {
                match parse_duration(value) {
                    Some(ms) => spec.settle_delay_ms = Some(ms),
                    None => issues.push(format!("bad settle delay `{value}`")),
                }
            } else if let Some(value) = token.strip_prefix("scroll:") {
                match value {
                    "top" => spec.scroll = Some(ScrollTo::Top),
                    "bottom" => spec.scroll = Some(ScrollTo::Bottom),
                    _ => issues.push(format!("bad scroll directive `{value}`")),
                }
            } else if let Some(value) = token.strip_prefix("show:") {
                spec.show = Some(value.to_string());
            } else if token == "transition:true" {
                spec.transition = true;
            } else if token == "transition:false" {
                spec.transition = false;
            } else if token == "ignore-title" || token == "ignore-title:true" {
                spec.ignore_title = true;
            } else {
                issues.push(format!("unknown swap modifier `{token}`"));
            }
        }
        spec
    }
}

/// An attribute value to restore on an element when the settle window
/// closes
#[derive(Debug, Clone)]
pub struct AttrRestore {
    pub node: NodeId,
    pub name: String,
    pub value: String,
}

/// What a swap did, for the settle phase to finish
#[derive(Debug, Default)]
pub struct SwapApplied {
    /// Top-level nodes inserted into the live tree (primary and OOB)
    pub inserted: Vec<NodeId>,
    /// Title carried by the fragment, unless suppressed
    pub title: Option<String>,
    /// Incoming attribute values deferred until settle
    pub attr_merges: Vec<AttrRestore>,
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("swap target is no longer in the document")]
    TargetDetached,
    #[error("swap extension `{0}` reported failure")]
    ExtensionFailed(String),
    #[error(transparent)]
    Dom(#[from] graft_dom::DomError),
}

/// Apply a fragment to the live tree
pub fn apply_swap(
    tree: &mut DomTree,
    config: &EngineConfig,
    extensions: &SwapExtensionRegistry,
    signals: &mut SignalLog,
    target: NodeId,
    fragment: &Fragment,
    spec: &SwapSpec,
    reselect: Option<&str>,
) -> Result<SwapApplied, SwapError> {
    if !tree.is_attached(target) && !matches!(spec.style, SwapStyle::None) {
        return Err(SwapError::TargetDetached);
    }

    let mut applied = SwapApplied::default();
    if !spec.ignore_title {
        applied.title = fragment.title.clone();
    }

    // Out-of-band children act on elements found by id anywhere in the
    // document, independent of the primary target.
    let mut primary: Vec<NodeId> = Vec::new();
    for child in top_level_content(&fragment.tree) {
        match fragment.tree.attr(child, "gx-swap-oob") {
            Some(directive) => {
                let directive = directive.to_string();
                apply_oob(tree, signals, &mut applied, &fragment.tree, child, &directive)?;
            }
            None => primary.push(child),
        }
    }

    if let Some(selector) = reselect {
        match Selector::parse(selector) {
            Ok(sel) => {
                primary = primary
                    .iter()
                    .flat_map(|&n| {
                        let mut matches = Vec::new();
                        if sel.matches(&fragment.tree, n) {
                            matches.push(n);
                        } else {
                            matches.extend(graft_dom::query_all(&fragment.tree, n, &sel));
                        }
                        matches
                    })
                    .collect();
            }
            Err(e) => signals.emit(
                tree,
                target,
                SignalKind::SyntaxError { detail: format!("bad reselect selector: {e}") },
            ),
        }
    }

    // unrecognized styles go to the extension registry; an unknown
    // name falls back to the configured default style
    let style = match &spec.style {
        SwapStyle::Extension(name) => match extensions.resolve(name) {
            Some(extension) => {
                if !extension.swap(tree, target, &fragment.tree) {
                    return Err(SwapError::ExtensionFailed(name.clone()));
                }
                return Ok(applied);
            }
            None => {
                signals.emit(
                    tree,
                    target,
                    SignalKind::SyntaxError {
                        detail: format!("unknown swap style `{name}`"),
                    },
                );
                match &config.default_swap_style {
                    SwapStyle::Extension(_) => SwapStyle::ReplaceInner,
                    other => other.clone(),
                }
            }
        },
        other => other.clone(),
    };

    match style {
        SwapStyle::Delete => {
            tree.detach(target)?;
            return Ok(applied);
        }
        SwapStyle::None => return Ok(applied),
        _ => {}
    }

    // Elements marked preserve keep their live node (with its runtime
    // state) instead of being recreated from the fragment.
    let preserved = collect_preserved(tree, &fragment.tree, &primary);
    for &(_, live) in &preserved {
        tree.detach(live)?;
    }

    let merge_snapshot = snapshot_merge_attrs(tree, config, &fragment.tree, &primary);

    let mut inserted: Vec<NodeId> = Vec::new();
    match &style {
        SwapStyle::ReplaceInner => {
            let old: Vec<NodeId> = tree.children(target).collect();
            for child in old {
                tree.detach(child)?;
            }
            for &node in &primary {
                let copy = tree.import(&fragment.tree, node)?;
                tree.append_child(target, copy)?;
                inserted.push(copy);
            }
        }
        SwapStyle::ReplaceOuter => {
            let parent = tree.parent(target).ok_or(SwapError::TargetDetached)?;
            for &node in &primary {
                let copy = tree.import(&fragment.tree, node)?;
                tree.insert_before(parent, copy, Some(target))?;
                inserted.push(copy);
            }
            tree.detach(target)?;
        }
        SwapStyle::InsertBeforeBegin => {
            let parent = tree.parent(target).ok_or(SwapError::TargetDetached)?;
            for &node in &primary {
                let copy = tree.import(&fragment.tree, node)?;
                tree.insert_before(parent, copy, Some(target))?;
                inserted.push(copy);
            }
        }
        SwapStyle::InsertAfterBegin => {
            let anchor = tree.first_child(target);
            for &node in &primary {
                let copy = tree.import(&fragment.tree, node)?;
                tree.insert_before(target, copy, anchor)?;
                inserted.push(copy);
            }
        }
        SwapStyle::InsertBeforeEnd => {
            for &node in &primary {
                let copy = tree.import(&fragment.tree, node)?;
                tree.append_child(target, copy)?;
                inserted.push(copy);
            }
        }
        SwapStyle::InsertAfterEnd => {
            let parent = tree.parent(target).ok_or(SwapError::TargetDetached)?;
            let anchor = tree.next_sibling(target);
            for &node in &primary {
                let copy = tree.import(&fragment.tree, node)?;
                tree.insert_before(parent, copy, anchor)?;
                inserted.push(copy);
            }
        }
        SwapStyle::Delete | SwapStyle::None | SwapStyle::Extension(_) => unreachable!(),
    }

    restore_preserved(tree, &preserved, &inserted)?;
    merge_attrs(tree, &mut applied, merge_snapshot, &inserted);

    applied.inserted.extend(inserted);
    tracing::debug!(target: "graft", style = ?spec.style, count = applied.inserted.len(), "swap applied");
    Ok(applied)
}

/// Top-level fragment children, with template wrappers unwrapped
fn top_level_content(fragment: &DomTree) -> Vec<NodeId> {
    let mut out = Vec::new();
    for child in fragment.children(NodeId::ROOT) {
        if fragment.tag(child) == Some("template") {
            out.extend(fragment.children(child));
        } else {
            out.push(child);
        }
    }
    out
}

fn apply_oob(
    tree: &mut DomTree,
    signals: &mut SignalLog,
    applied: &mut SwapApplied,
    fragment: &DomTree,
    child: NodeId,
    directive: &str,
) -> Result<(), SwapError> {
    let (style_raw, explicit_selector) = match directive.split_once(':') {
        Some((s, sel)) => (s, Some(sel)),
        None => (directive, None),
    };
    // `true` relocates the child's content into the matching element
    let style = if style_raw == "true" {
        SwapStyle::ReplaceInner
    } else {
        SwapStyle::parse(style_raw)
    };

    let live = match explicit_selector {
        Some(selector) => Selector::parse(selector)
            .ok()
            .and_then(|sel| graft_dom::query_first(tree, NodeId::ROOT, &sel)),
        None => fragment
            .attr(child, "id")
            .and_then(|id| tree.find_by_id(id)),
    };
    let Some(live) = live else {
        let wanted = explicit_selector
            .map(str::to_string)
            .or_else(|| fragment.attr(child, "id").map(|id| format!("#{id}")))
            .unwrap_or_else(|| "<no id>".to_string());
        signals.emit(
            tree,
            NodeId::ROOT,
            SignalKind::TargetNotFound { selector: wanted },
        );
        return Ok(());
    };

    match style {
        SwapStyle::ReplaceInner => {
            let old: Vec<NodeId> = tree.children(live).collect();
            for n in old {
                tree.detach(n)?;
            }
            for inner in fragment.children(child).collect::<Vec<_>>() {
                let copy = tree.import(fragment, inner)?;
                tree.append_child(live, copy)?;
                applied.inserted.push(copy);
            }
        }
        SwapStyle::ReplaceOuter => {
            let parent = tree.parent(live).ok_or(SwapError::TargetDetached)?;
            let copy = tree.import(fragment, child)?;
            tree.insert_before(parent, copy, Some(live))?;
            tree.detach(live)?;
            // the marker attribute must not survive into the document
            if let Some(elem) = tree.element_mut(copy) {
                elem.remove_attr("gx-swap-oob");
            }
            applied.inserted.push(copy);
        }
        SwapStyle::InsertBeforeEnd => {
            let copy = tree.import(fragment, child)?;
            if let Some(elem) = tree.element_mut(copy) {
                elem.remove_attr("gx-swap-oob");
            }
            tree.append_child(live, copy)?;
            applied.inserted.push(copy);
        }
        SwapStyle::InsertAfterBegin => {
            let copy = tree.import(fragment, child)?;
            if let Some(elem) = tree.element_mut(copy) {
                elem.remove_attr("gx-swap-oob");
            }
            let anchor = tree.first_child(live);
            tree.insert_before(live, copy, anchor)?;
            applied.inserted.push(copy);
        }
        SwapStyle::Delete => {
            tree.detach(live)?;
        }
        other => {
            signals.emit(
                tree,
                NodeId::ROOT,
                SignalKind::SyntaxError {
                    detail: format!("unsupported out-of-band style {other:?}"),
                },
            );
        }
    }
    Ok(())
}

/// (id attribute value, live node) pairs for incoming preserve markers
fn collect_preserved(
    tree: &DomTree,
    fragment: &DomTree,
    primary: &[NodeId],
) -> Vec<(String, NodeId)> {
    let mut out = Vec::new();
    for &root in primary {
        let mut candidates: Vec<NodeId> = vec![root];
        candidates.extend(fragment.descendants(root));
        for node in candidates {
            if fragment.attr(node, "gx-preserve").is_none() {
                continue;
            }
            let Some(id) = fragment.attr(node, "id") else {
                continue;
            };
            if let Some(live) = tree.find_by_id(id) {
                out.push((id.to_string(), live));
            }
        }
    }
    out
}

/// Swap each imported preserve placeholder for the detached original
fn restore_preserved(
    tree: &mut DomTree,
    preserved: &[(String, NodeId)],
    inserted: &[NodeId],
) -> Result<(), SwapError> {
    for (id, live) in preserved {
        let placeholder = inserted.iter().copied().find_map(|root| {
            if tree.attr(root, "id") == Some(id.as_str()) {
                return Some(root);
            }
            tree.descendants(root)
                .find(|&n| tree.attr(n, "id") == Some(id.as_str()))
        });
        if let Some(placeholder) = placeholder {
            let parent = tree.parent(placeholder).ok_or(SwapError::TargetDetached)?;
            tree.insert_before(parent, *live, Some(placeholder))?;
            tree.detach(placeholder)?;
        }
    }
    Ok(())
}

/// Old attribute values for ids present in the incoming content
fn snapshot_merge_attrs(
    tree: &DomTree,
    config: &EngineConfig,
    fragment: &DomTree,
    primary: &[NodeId],
) -> Vec<(String, Vec<(String, String)>)> {
    let mut out = Vec::new();
    for &root in primary {
        let mut candidates: Vec<NodeId> = vec![root];
        candidates.extend(fragment.descendants(root));
        for node in candidates {
            let Some(id) = fragment.attr(node, "id") else {
                continue;
            };
            let Some(live) = tree.find_by_id(id) else {
                continue;
            };
            let mut attrs = Vec::new();
            for name in &config.attr_merge_allowlist {
                if let Some(value) = tree.attr(live, name) {
                    attrs.push((name.clone(), value.to_string()));
                }
            }
            if !attrs.is_empty() {
                out.push((id.to_string(), attrs));
            }
        }
    }
    out
}

/// Temporarily re-apply old attribute values to inserted elements and
/// record the incoming values for restoration at settle
fn merge_attrs(
    tree: &mut DomTree,
    applied: &mut SwapApplied,
    snapshot: Vec<(String, Vec<(String, String)>)>,
    inserted: &[NodeId],
) {
    for (id, old_attrs) in snapshot {
        let node = inserted.iter().copied().find_map(|root| {
            if tree.attr(root, "id") == Some(id.as_str()) {
                return Some(root);
            }
            tree.descendants(root)
                .find(|&n| tree.attr(n, "id") == Some(id.as_str()))
        });
        let Some(node) = node else { continue };
        for (name, old_value) in old_attrs {
            let incoming = tree.attr(node, &name).map(str::to_string);
            match incoming {
                Some(new_value) if new_value != old_value => {
                    tree.set_attr(node, &name, &old_value);
                    applied.attr_merges.push(AttrRestore {
                        node,
                        name,
                        value: new_value,
                    });
                }
                _ => {}
            }
        }
    }
}
