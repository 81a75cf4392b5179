//! Request coordination and plan building
//!
//! Two jobs. First, turn an annotated element into a [`RequestPlan`]:
//! verb, URL, target, parameters, headers. The plan is built eagerly at
//! trigger time so a queued follow-up carries the values that were
//! current when its trigger fired, not when it finally runs. Second,
//! arbitrate concurrent requests per governing element through
//! [`Coordinator`]: drop, abort, replace, or queue.

use std::collections::{BTreeMap, VecDeque};

use graft_dom::forms::{self, EntryValue};
use graft_dom::validation::{validate_control, ValidityState};
use graft_dom::{DomTree, NodeId, Selector};
use graft_net::{HeaderMap, Verb};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::exchange::ExchangeId;
use crate::params::{ParamMap, ParamValue};
use crate::signal::{SignalKind, SignalLog};
use crate::target::{TargetError, TargetRef};

/// Queueing discipline for requests held behind an active one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Keep only the first queued request
    First,
    /// Keep only the most recent queued request
    Last,
    /// Keep every queued request in order
    All,
    /// Queue nothing; later triggers are dropped
    None,
}

impl QueuePolicy {
    pub fn parse(raw: &str) -> Option<QueuePolicy> {
        match raw {
            "first" => Some(QueuePolicy::First),
            "last" => Some(QueuePolicy::Last),
            "all" => Some(QueuePolicy::All),
            "none" => Some(QueuePolicy::None),
            _ => None,
        }
    }
}

/// How a new request relates to one already active on the governing
/// element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Discard the new request while one is active
    Drop,
    /// Abort the active request and proceed
    Abort,
    /// Like abort, and mark the new request abortable in turn
    Replace,
    /// Hold the new request until the active one settles
    Queue(QueuePolicy),
}

impl SyncPolicy {
    pub fn parse(raw: &str) -> Option<SyncPolicy> {
        match raw {
            "drop" => Some(SyncPolicy::Drop),
            "abort" => Some(SyncPolicy::Abort),
            "replace" => Some(SyncPolicy::Replace),
            "queue" => Some(SyncPolicy::Queue(QueuePolicy::Last)),
            _ => raw
                .strip_prefix("queue ")
                .and_then(QueuePolicy::parse)
                .map(SyncPolicy::Queue),
        }
    }
}

/// A sync directive resolved to the element whose requests it governs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncDirective {
    pub governing: NodeId,
    pub policy: SyncPolicy,
}

/// Find the sync directive applying to `element`: the nearest
/// ancestor-or-self `gx-sync` attribute, or a queue modifier from the
/// trigger clause. `None` means requests run unconstrained. A
/// malformed attribute is reported and degrades to drop on the
/// annotated element rather than dispatching uncoordinated.
pub fn resolve_sync(
    tree: &DomTree,
    signals: &mut SignalLog,
    element: NodeId,
    trigger_queue: Option<QueuePolicy>,
) -> Option<SyncDirective> {
    let mut current = element;
    while current.is_some() {
        if let Some(raw) = tree.attr(current, "gx-sync") {
            let (target_expr, policy_raw) = match raw.rsplit_once(':') {
                Some((t, p)) => (t.trim(), p.trim()),
                None => (raw.trim(), "drop"),
            };
            let Some(policy) = SyncPolicy::parse(policy_raw) else {
                signals.emit(
                    tree,
                    current,
                    SignalKind::SyntaxError {
                        detail: format!("unknown gx-sync policy `{policy_raw}`"),
                    },
                );
                return Some(SyncDirective { governing: current, policy: SyncPolicy::Drop });
            };
            let governing = match TargetRef::parse(target_expr).resolve(tree, current) {
                Ok(node) => node,
                Err(_) => {
                    signals.emit(
                        tree,
                        current,
                        SignalKind::TargetNotFound {
                            selector: target_expr.to_string(),
                        },
                    );
                    return Some(SyncDirective { governing: current, policy: SyncPolicy::Drop });
                }
            };
            return Some(SyncDirective { governing, policy });
        }
        current = tree.parent(current).unwrap_or(NodeId::NONE);
    }
    trigger_queue.map(|policy| SyncDirective {
        governing: element,
        policy: SyncPolicy::Queue(policy),
    })
}

/// Everything needed to issue one request, captured at trigger time
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub element: NodeId,
    pub verb: Verb,
    pub url: String,
    pub target: NodeId,
    pub params: ParamMap,
    pub headers: HeaderMap,
    /// Raw swap attribute value, parsed at response time
    pub swap_attr: Option<String>,
    /// Raw push-url attribute value
    pub push_url: Option<String>,
    pub queue: Option<QueuePolicy>,
    /// Marks a history-restore fetch so the request header says so
    pub history_restore: bool,
    /// Marks a poll tick so a cancel status can stop the loop
    pub polling: bool,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("element carries no verb attribute")]
    NoVerb,
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("constraint validation failed")]
    Validation { control: NodeId, state: ValidityState },
    #[error("bad gx-vals JSON: {0}")]
    BadVals(String),
    #[error("bad gx-headers JSON: {0}")]
    BadHeaders(String),
    #[error("bad gx-include selector: {0}")]
    BadInclude(String),
}

const VERB_ATTRS: [(&str, Verb); 5] = [
    ("gx-get", Verb::Get),
    ("gx-post", Verb::Post),
    ("gx-put", Verb::Put),
    ("gx-patch", Verb::Patch),
    ("gx-delete", Verb::Delete),
];

/// Read an attribute from the element or its nearest annotated ancestor
pub fn inherited_attr<'a>(tree: &'a DomTree, element: NodeId, name: &str) -> Option<&'a str> {
    let mut current = element;
    while current.is_some() {
        if let Some(value) = tree.attr(current, name) {
            return Some(value);
        }
        current = tree.parent(current).unwrap_or(NodeId::NONE);
    }
    None
}

/// Build the request plan for an annotated element
pub fn build_plan(
    tree: &DomTree,
    config: &EngineConfig,
    signals: &mut SignalLog,
    element: NodeId,
    queue: Option<QueuePolicy>,
    polling: bool,
) -> Result<RequestPlan, PlanError> {
    let (verb, url) = VERB_ATTRS
        .iter()
        .find_map(|(attr, verb)| tree.attr(element, attr).map(|url| (*verb, url.to_string())))
        .ok_or(PlanError::NoVerb)?;

    let target = match inherited_attr(tree, element, "gx-target") {
        Some(raw) => match TargetRef::parse(raw).resolve(tree, element) {
            Ok(id) => id,
            Err(err) => {
                if let TargetError::NotFound(selector) = &err {
                    signals.emit(
                        tree,
                        element,
                        SignalKind::TargetNotFound { selector: selector.clone() },
                    );
                }
                return Err(err.into());
            }
        },
        None => element,
    };

    let mut params = ParamMap::new();
    collect_element_params(tree, element, &mut params);
    apply_include(tree, element, &mut params)?;
    apply_vals(tree, element, &mut params)?;
    apply_params_filter(tree, element, &mut params);

    if config.validate_forms && !verb.is_get() {
        if let Some((control, state)) = first_invalid_control(tree, element) {
            signals.emit(tree, element, SignalKind::ValidationHalt { control });
            return Err(PlanError::Validation { control, state });
        }
    }

    let mut headers = HeaderMap::new();
    if let Some(raw) = tree.attr(element, "gx-headers") {
        let parsed: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| PlanError::BadHeaders(e.to_string()))?;
        let object = parsed
            .as_object()
            .ok_or_else(|| PlanError::BadHeaders("expected a JSON object".to_string()))?;
        for (key, value) in object {
            headers.append(key, &json_to_text(value));
        }
    }

    Ok(RequestPlan {
        element,
        verb,
        url,
        target,
        params,
        headers,
        swap_attr: inherited_attr(tree, element, "gx-swap").map(str::to_string),
        push_url: inherited_attr(tree, element, "gx-push-url").map(str::to_string),
        queue,
        history_restore: false,
        polling,
    })
}

fn json_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collect_element_params(tree: &DomTree, element: NodeId, params: &mut ParamMap) {
    let entries = if forms::is_form(tree, element) {
        forms::form_entries(tree, element)
    } else {
        let mut own = forms::control_entries(tree, element);
        // A control inside a form submits the whole form's values
        if let Some(form) = forms::owning_form(tree, element) {
            let submitter = std::mem::take(&mut own);
            own = forms::form_entries(tree, form);
            for (name, value) in submitter {
                if !own.iter().any(|(n, _)| n == &name) {
                    own.push((name, value));
                }
            }
        }
        own
    };
    for (name, value) in entries {
        params.append(&name, ParamValue::from(value));
    }
}

fn apply_include(
    tree: &DomTree,
    element: NodeId,
    params: &mut ParamMap,
) -> Result<(), PlanError> {
    let Some(raw) = tree.attr(element, "gx-include") else {
        return Ok(());
    };
    let selector =
        Selector::parse(raw).map_err(|e| PlanError::BadInclude(e.to_string()))?;
    let mut included: Vec<(String, EntryValue)> = Vec::new();
    for matched in graft_dom::query_all(tree, NodeId::ROOT, &selector) {
        if forms::is_form(tree, matched) {
            included.extend(forms::form_entries(tree, matched));
        } else {
            included.extend(forms::control_entries(tree, matched));
        }
    }
    // Included values override same-named element values
    let mut seen: Vec<String> = Vec::new();
    for (name, value) in included {
        if seen.iter().any(|s| s == &name) {
            params.append(&name, ParamValue::from(value));
        } else {
            params.replace_all(&name, ParamValue::from(value));
            seen.push(name);
        }
    }
    Ok(())
}

fn apply_vals(tree: &DomTree, element: NodeId, params: &mut ParamMap) -> Result<(), PlanError> {
    let Some(raw) = inherited_attr(tree, element, "gx-vals") else {
        return Ok(());
    };
    let parsed: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| PlanError::BadVals(e.to_string()))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| PlanError::BadVals("expected a JSON object".to_string()))?;
    for (key, value) in object {
        params.replace_all(key, ParamValue::Text(json_to_text(value)));
    }
    Ok(())
}

fn apply_params_filter(tree: &DomTree, element: NodeId, params: &mut ParamMap) {
    let Some(raw) = inherited_attr(tree, element, "gx-params") else {
        return;
    };
    let raw = raw.trim();
    if raw == "*" {
        return;
    }
    if raw == "none" {
        params.retain_keys(|_| false);
        return;
    }
    if let Some(listed) = raw.strip_prefix("not ") {
        let excluded: Vec<&str> = listed.split(',').map(str::trim).collect();
        params.retain_keys(|k| !excluded.contains(&k));
    } else {
        let included: Vec<&str> = raw.split(',').map(str::trim).collect();
        params.retain_keys(|k| included.contains(&k));
    }
}

fn first_invalid_control(tree: &DomTree, element: NodeId) -> Option<(NodeId, ValidityState)> {
    let scope = if forms::is_form(tree, element) {
        element
    } else {
        forms::owning_form(tree, element).unwrap_or(element)
    };
    let candidates: Vec<NodeId> = if forms::is_form(tree, scope) {
        tree.descendants(scope)
            .filter(|&n| forms::is_form_control(tree, n))
            .collect()
    } else if forms::is_form_control(tree, scope) {
        vec![scope]
    } else {
        Vec::new()
    };
    for control in candidates {
        let state = validate_control(tree, control);
        if !state.is_valid() {
            return Some((control, state));
        }
    }
    None
}

#[derive(Debug, Default)]
struct ElementRequestState {
    owner: Option<ExchangeId>,
    abortable: bool,
    queue: VecDeque<RequestPlan>,
}

/// Outcome of admitting a new request against a governing element
#[derive(Debug)]
pub enum Admission {
    Proceed {
        /// The plan, handed back for dispatch
        plan: RequestPlan,
        /// An active exchange the engine must abort first
        abort_first: Option<ExchangeId>,
        /// Whether the new exchange may itself be displaced later
        mark_abortable: bool,
    },
    Dropped,
    Queued,
}

/// Per-element request arbitration
#[derive(Debug, Default)]
pub struct Coordinator {
    states: BTreeMap<NodeId, ElementRequestState>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner_of(&self, governing: NodeId) -> Option<ExchangeId> {
        self.states.get(&governing).and_then(|s| s.owner)
    }

    /// Decide what to do with a new request. The caller records the
    /// owner (on Proceed) or has already handed over the plan (Queued).
    pub fn admit(
        &mut self,
        directive: SyncDirective,
        plan: RequestPlan,
    ) -> Admission {
        let state = self.states.entry(directive.governing).or_default();
        let Some(active) = state.owner else {
            return Admission::Proceed {
                plan,
                abort_first: None,
                mark_abortable: matches!(directive.policy, SyncPolicy::Replace),
            };
        };
        match directive.policy {
            SyncPolicy::Drop => {
                if state.abortable {
                    Admission::Proceed {
                        plan,
                        abort_first: Some(active),
                        mark_abortable: false,
                    }
                } else {
                    tracing::debug!(target: "graft", governing = directive.governing.0, "request dropped");
                    Admission::Dropped
                }
            }
            SyncPolicy::Abort | SyncPolicy::Replace => Admission::Proceed {
                plan,
                abort_first: Some(active),
                mark_abortable: matches!(directive.policy, SyncPolicy::Replace),
            },
            SyncPolicy::Queue(policy) => {
                match policy {
                    QueuePolicy::First => {
                        if state.queue.is_empty() {
                            state.queue.push_back(plan);
                        }
                    }
                    QueuePolicy::Last => {
                        state.queue.clear();
                        state.queue.push_back(plan);
                    }
                    QueuePolicy::All => state.queue.push_back(plan),
                    QueuePolicy::None => {}
                }
                Admission::Queued
            }
        }
    }

    /// Record the exchange now owning the governing element
    pub fn record_owner(&mut self, governing: NodeId, exchange: ExchangeId, abortable: bool) {
        let state = self.states.entry(governing).or_default();
        state.owner = Some(exchange);
        state.abortable = abortable;
    }

    /// Release ownership when an exchange settles, then hand back at
    /// most one queued plan for reissue. Ownership is cleared before
    /// the dequeue so the follow-up admits cleanly.
    pub fn settle(&mut self, governing: NodeId, exchange: ExchangeId) -> Option<RequestPlan> {
        let state = self.states.get_mut(&governing)?;
        if state.owner == Some(exchange) {
            state.owner = None;
            state.abortable = false;
        }
        let next = state.queue.pop_front();
        if state.owner.is_none() && state.queue.is_empty() {
            self.states.remove(&governing);
        }
        next
    }

    /// Clear ownership for an exchange displaced by a superseding
    /// request. Unlike [`Coordinator::settle`] this leaves the queue
    /// alone: the superseding request takes the slot, and buffered
    /// continuations wait for it.
    pub fn displace(&mut self, governing: NodeId, exchange: ExchangeId) {
        let Some(state) = self.states.get_mut(&governing) else {
            return;
        };
        if state.owner == Some(exchange) {
            state.owner = None;
            state.abortable = false;
        }
        if state.owner.is_none() && state.queue.is_empty() {
            self.states.remove(&governing);
        }
    }

    /// Pull one queued plan without an exchange settling, used when an
    /// admitted request dies before dispatch
    pub fn dequeue(&mut self, governing: NodeId) -> Option<RequestPlan> {
        let state = self.states.get_mut(&governing)?;
        if state.owner.is_some() {
            return None;
        }
        let next = state.queue.pop_front();
        if state.queue.is_empty() {
            self.states.remove(&governing);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_for(element: NodeId) -> RequestPlan {
        RequestPlan {
            element,
            verb: Verb::Get,
            url: "/x".to_string(),
            target: element,
            params: ParamMap::new(),
            headers: HeaderMap::new(),
            swap_attr: None,
            push_url: None,
            queue: None,
            history_restore: false,
            polling: false,
        }
    }

    #[test]
    fn test_drop_policy() {
        let mut coord = Coordinator::new();
        let el = NodeId(1);
        let directive = SyncDirective { governing: el, policy: SyncPolicy::Drop };

        assert!(matches!(
            coord.admit(directive, plan_for(el)),
            Admission::Proceed { abort_first: None, .. }
        ));
        coord.record_owner(el, ExchangeId(1), false);
        assert!(matches!(coord.admit(directive, plan_for(el)), Admission::Dropped));
    }

    #[test]
    fn test_replace_aborts_active() {
        let mut coord = Coordinator::new();
        let el = NodeId(1);
        let directive = SyncDirective { governing: el, policy: SyncPolicy::Replace };

        coord.record_owner(el, ExchangeId(1), true);
        match coord.admit(directive, plan_for(el)) {
            Admission::Proceed { abort_first, mark_abortable, .. } => {
                assert_eq!(abort_first, Some(ExchangeId(1)));
                assert!(mark_abortable);
            }
            other => panic!("expected proceed, got {other:?}"),
        }
    }

    #[test]
    fn test_queue_last_keeps_newest() {
        let mut coord = Coordinator::new();
        let el = NodeId(1);
        let directive = SyncDirective {
            governing: el,
            policy: SyncPolicy::Queue(QueuePolicy::Last),
        };

        coord.record_owner(el, ExchangeId(1), false);
        let mut second = plan_for(el);
        second.url = "/second".to_string();
        let mut third = plan_for(el);
        third.url = "/third".to_string();
        assert!(matches!(coord.admit(directive, second), Admission::Queued));
        assert!(matches!(coord.admit(directive, third), Admission::Queued));

        let next = coord.settle(el, ExchangeId(1)).unwrap();
        assert_eq!(next.url, "/third");
        assert!(coord.settle(el, ExchangeId(1)).is_none());
    }

    #[test]
    fn test_settle_clears_owner_first() {
        let mut coord = Coordinator::new();
        let el = NodeId(1);
        coord.record_owner(el, ExchangeId(7), false);
        coord.settle(el, ExchangeId(7));
        assert!(coord.owner_of(el).is_none());
    }

    #[test]
    fn test_malformed_sync_policy_degrades_to_drop() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        tree.set_attr(div, "gx-sync", "this:bogus");
        tree.append_child(NodeId::ROOT, div).unwrap();

        let mut signals = SignalLog::new();
        let directive = resolve_sync(&tree, &mut signals, div, None).unwrap();
        assert_eq!(directive.policy, SyncPolicy::Drop);
        assert_eq!(directive.governing, div);
        assert!(signals
            .drain()
            .iter()
            .any(|s| matches!(s.kind, SignalKind::SyntaxError { .. })));
    }

    #[test]
    fn test_unresolvable_sync_target_degrades_to_drop() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        tree.set_attr(div, "gx-sync", "#missing:abort");
        tree.append_child(NodeId::ROOT, div).unwrap();

        let mut signals = SignalLog::new();
        let directive = resolve_sync(&tree, &mut signals, div, None).unwrap();
        assert_eq!(directive.policy, SyncPolicy::Drop);
        assert!(signals
            .drain()
            .iter()
            .any(|s| matches!(s.kind, SignalKind::TargetNotFound { .. })));
    }

    #[test]
    fn test_displace_keeps_queue() {
        let mut coord = Coordinator::new();
        let el = NodeId(1);
        let directive = SyncDirective {
            governing: el,
            policy: SyncPolicy::Queue(QueuePolicy::All),
        };
        coord.record_owner(el, ExchangeId(1), false);
        assert!(matches!(coord.admit(directive, plan_for(el)), Admission::Queued));

        coord.displace(el, ExchangeId(1));
        assert!(coord.owner_of(el).is_none());
        // the buffered plan is still there for the next settle
        coord.record_owner(el, ExchangeId(2), false);
        assert!(coord.settle(el, ExchangeId(2)).is_some());
    }

    #[test]
    fn test_sync_policy_parse() {
        assert_eq!(SyncPolicy::parse("drop"), Some(SyncPolicy::Drop));
        assert_eq!(
            SyncPolicy::parse("queue first"),
            Some(SyncPolicy::Queue(QueuePolicy::First))
        );
        assert_eq!(
            SyncPolicy::parse("queue"),
            Some(SyncPolicy::Queue(QueuePolicy::Last))
        );
        assert_eq!(SyncPolicy::parse("bogus"), None);
    }
}
