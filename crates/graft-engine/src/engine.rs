//! Engine orchestration
//!
//! Owns the document and every subsystem, and exposes the cooperative
//! surface a host drives: native events in, wire requests out through
//! the transport, responses back in, and a virtual clock for all
//! delayed work. Nothing here blocks or spawns; the host decides when
//! time passes and when responses arrive.

use std::collections::BTreeMap;

use graft_dom::{query_all, DomTree, NodeId, Rect, Selector};
use graft_html::{inner_html, Fragment, HtmlParser};
use graft_net::WireResponse;

use crate::binder::{Binder, Fire, NativeEvent};
use crate::config::EngineConfig;
use crate::coordinate::{
    build_plan, inherited_attr, resolve_sync, Admission, Coordinator, QueuePolicy, RequestPlan,
};
use crate::exchange::{
    build_wire_request, resolve_url, ExchangePhase, ExchangeTable, ExchangeId, Transport,
    TransportFailure,
};
use crate::history::{normalize_url, HistorySnapshot, HistoryStorage, HistoryStore, MemoryStorage};
use crate::registry::{GuardRegistry, SwapExtension, SwapExtensionRegistry};
use crate::router::{classify, ResponseDirectives};
use crate::scheduler::{Scheduler, Task, TaskId};
use crate::signal::{ScrollTo, Signal, SignalKind, SignalLog};
use crate::swap::{apply_swap, SwapApplied, SwapSpec};
use crate::target::TargetRef;
use crate::trigger::{TriggerParser, TriggerSource};

/// Hook deciding whether a confirm-gated request proceeds
pub type ConfirmFn = dyn Fn(&str) -> bool;
/// Hook able to veto any request just before dispatch
pub type RequestGateFn = dyn Fn(&DomTree, &RequestPlan) -> bool;

struct PendingSwap {
    element: NodeId,
    governing: NodeId,
    target: NodeId,
    fragment: Fragment,
    spec: SwapSpec,
    reselect: Option<String>,
    after_swap: Vec<String>,
    after_settle: Vec<String>,
    push_url: Option<String>,
    replace_url: Option<String>,
}

struct PendingSettle {
    element: NodeId,
    governing: NodeId,
    target: NodeId,
    applied: SwapApplied,
    after_settle: Vec<String>,
    scroll: Option<ScrollTo>,
    show: Option<String>,
    push_url: Option<String>,
    replace_url: Option<String>,
}

/// The hypermedia exchange engine
pub struct Engine {
    tree: DomTree,
    config: EngineConfig,
    html: HtmlParser,
    parser: TriggerParser,
    binder: Binder,
    scheduler: Scheduler,
    coordinator: Coordinator,
    exchanges: ExchangeTable,
    pending_swaps: BTreeMap<ExchangeId, PendingSwap>,
    pending_settles: BTreeMap<ExchangeId, PendingSettle>,
    history: HistoryStore,
    storage: Box<dyn HistoryStorage>,
    signals: SignalLog,
    guards: GuardRegistry,
    extensions: SwapExtensionRegistry,
    transport: Box<dyn Transport>,
    confirm: Option<Box<ConfirmFn>>,
    request_gate: Option<Box<RequestGateFn>>,
    location: String,
    title: Option<String>,
    bounds: BTreeMap<NodeId, Rect>,
    viewport: Rect,
    scan_task: Option<TaskId>,
}

impl Engine {
    pub fn new(config: EngineConfig, transport: Box<dyn Transport>) -> Self {
        let history = HistoryStore::new(config.history_cache_size);
        Self {
            tree: DomTree::new(),
            config,
            html: HtmlParser::new(),
            parser: TriggerParser::new(),
            binder: Binder::new(),
            scheduler: Scheduler::new(),
            coordinator: Coordinator::new(),
            exchanges: ExchangeTable::new(),
            pending_swaps: BTreeMap::new(),
            pending_settles: BTreeMap::new(),
            history,
            storage: Box::new(MemoryStorage::new()),
            signals: SignalLog::new(),
            guards: GuardRegistry::new(),
            extensions: SwapExtensionRegistry::new(),
            transport,
            confirm: None,
            request_gate: None,
            location: "http://localhost/".to_string(),
            title: None,
            bounds: BTreeMap::new(),
            viewport: Rect::from_xywh(0.0, 0.0, 1024.0, 768.0),
            scan_task: None,
        }
    }

    /// Parse a document, adopt it, and bind every annotated element
    pub fn load_document(&mut self, html: &str, url: &str) {
        self.tree = self.html.parse_document(html);
        self.location = url.to_string();
        self.title = self
            .tree
            .descendants(NodeId::ROOT)
            .find(|&n| self.tree.tag(n) == Some("title"))
            .map(|t| self.tree.text_content(t).trim().to_string());
        self.history.restore_from(self.storage.as_mut());
        self.bind_subtree(NodeId::ROOT);
        tracing::info!(target: "graft", url, bound = self.binder.bound_elements().len(), "document loaded");
    }

    pub fn document(&self) -> &DomTree {
        &self.tree
    }

    pub fn document_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Take every signal emitted since the last drain
    pub fn drain_signals(&mut self) -> Vec<Signal> {
        self.signals.drain()
    }

    pub fn register_guard(
        &mut self,
        name: &str,
        guard: impl Fn(&DomTree, NodeId) -> Result<bool, String> + 'static,
    ) {
        self.guards.register(name, guard);
    }

    pub fn register_swap_extension(&mut self, extension: Box<dyn SwapExtension>) {
        self.extensions.register(extension);
    }

    pub fn set_confirm_handler(&mut self, handler: impl Fn(&str) -> bool + 'static) {
        self.confirm = Some(Box::new(handler));
    }

    pub fn set_request_gate(
        &mut self,
        gate: impl Fn(&DomTree, &RequestPlan) -> bool + 'static,
    ) {
        self.request_gate = Some(Box::new(gate));
    }

    pub fn set_history_storage(&mut self, storage: Box<dyn HistoryStorage>) {
        self.storage = storage;
    }

    /// Host-reported geometry for reveal/intersect triggers
    pub fn set_bounds(&mut self, element: NodeId, rect: Rect) {
        self.bounds.insert(element, rect);
    }

    pub fn set_viewport(&mut self, rect: Rect) {
        self.viewport = rect;
    }

    // ------------------------------------------------------------------
    // lifecycle hooks

    /// The host inserted a subtree; bind its annotated elements
    pub fn on_mount(&mut self, root: NodeId) {
        self.bind_subtree(root);
    }

    /// The host is removing a subtree; release its bindings
    pub fn on_unmount(&mut self, root: NodeId) {
        let mut affected: Vec<NodeId> = vec![root];
        affected.extend(self.tree.descendants(root));
        for element in affected {
            if self.binder.is_bound(element) {
                self.binder.unbind(&mut self.scheduler, element);
            }
            self.bounds.remove(&element);
        }
    }

    /// The host changed an attribute; re-read the element's bindings
    pub fn on_attribute_changed(&mut self, element: NodeId, name: &str) {
        if !name.starts_with("gx-") {
            return;
        }
        if self.binder.is_bound(element) {
            self.binder.unbind(&mut self.scheduler, element);
        }
        if element_is_annotated(&self.tree, element) {
            self.binder.bind(
                &self.tree,
                &mut self.parser,
                &mut self.scheduler,
                &mut self.signals,
                element,
            );
            self.schedule_scan();
        }
    }

    // ------------------------------------------------------------------
    // driving

    /// Feed a native event in. Returns true when a consume modifier
    /// swallowed it.
    pub fn handle_event(&mut self, event: &NativeEvent) -> bool {
        let outcome = self.binder.on_event(
            &self.tree,
            &mut self.scheduler,
            &self.guards,
            &mut self.signals,
            event,
        );
        for fire in outcome.fires {
            self.fire(fire);
        }
        outcome.consumed
    }

    /// Fire an element's request programmatically, bypassing triggers
    pub fn trigger_now(&mut self, element: NodeId) {
        self.issue(element, None, false);
    }

    /// Move the virtual clock and run everything that came due
    pub fn advance(&mut self, now_ms: u64) {
        let tasks = self.scheduler.advance(now_ms);
        for task in tasks {
            match task {
                Task::DebounceFire { element, spec } => {
                    if let Some(fire) = self.binder.debounce_elapsed(element, spec) {
                        if self.tree.is_attached(element) {
                            self.fire(fire);
                        }
                    }
                }
                Task::Poll { element, spec } => {
                    if let Some(fire) =
                        self.binder
                            .poll_elapsed(&self.tree, &mut self.scheduler, element, spec)
                    {
                        self.fire(fire);
                    }
                }
                Task::LoadFire { element, spec } => {
                    if let Some(fire) = self.binder.load_elapsed(&self.tree, element, spec) {
                        self.fire(fire);
                    }
                }
                Task::RevealScan => {
                    self.scan_task = None;
                    let fires =
                        self.binder
                            .scan_viewport(&self.tree, &self.bounds, self.viewport);
                    for fire in fires {
                        self.fire(fire);
                    }
                    self.schedule_scan();
                }
                Task::ApplySwap { exchange } => self.apply_pending_swap(exchange),
                Task::Settle { exchange } => self.finish_settle(exchange),
            }
        }
    }

    /// Deliver a transport outcome for an exchange
    pub fn complete(&mut self, id: ExchangeId, result: Result<WireResponse, TransportFailure>) {
        let (plan, governing, indicators, disabled) = {
            let Some(exchange) = self.exchanges.get_mut(id) else {
                // already aborted; late responses are dropped
                return;
            };
            exchange.phase = ExchangePhase::Settling;
            (
                exchange.plan.clone(),
                exchange.governing,
                std::mem::take(&mut exchange.indicators),
                std::mem::take(&mut exchange.disabled),
            )
        };
        self.clear_request_ui(&indicators, &disabled);
        self.signals
            .emit(&self.tree, plan.element, SignalKind::AfterRequest);
        match result {
            Err(failure) => {
                let kind = match failure {
                    TransportFailure::Timeout => SignalKind::Timeout,
                    TransportFailure::Network(detail) => SignalKind::TransportFailure { detail },
                };
                self.signals.emit(&self.tree, plan.element, kind);
                self.settle_exchange(governing, id);
            }
            Ok(response) => self.process_response(id, plan, governing, response),
        }
    }

    /// Abort an in-flight exchange. Aborting settles it: ownership
    /// clears and one queued continuation, if any, is re-issued.
    pub fn abort(&mut self, id: ExchangeId) {
        let (element, governing, indicators, disabled) = {
            let Some(exchange) = self.exchanges.get_mut(id) else {
                return;
            };
            exchange.phase = ExchangePhase::Aborted;
            (
                exchange.plan.element,
                exchange.governing,
                std::mem::take(&mut exchange.indicators),
                std::mem::take(&mut exchange.disabled),
            )
        };
        self.pending_swaps.remove(&id);
        self.pending_settles.remove(&id);
        self.clear_request_ui(&indicators, &disabled);
        self.signals.emit(&self.tree, element, SignalKind::Abort);
        self.settle_exchange(governing, id);
    }

    /// Abort an exchange displaced by a superseding request on the same
    /// governing element. Ownership clears without dequeuing: the
    /// superseding request takes the slot and any buffered
    /// continuations wait for it to settle.
    fn abort_superseded(&mut self, id: ExchangeId) {
        let Some(exchange) = self.exchanges.remove(id) else {
            return;
        };
        self.pending_swaps.remove(&id);
        self.pending_settles.remove(&id);
        self.clear_request_ui(&exchange.indicators, &exchange.disabled);
        self.signals
            .emit(&self.tree, exchange.plan.element, SignalKind::Abort);
        self.coordinator.displace(exchange.governing, id);
    }

    // ------------------------------------------------------------------
    // history

    /// Navigate back/forward to a URL. A cached snapshot replays
    /// instantly; a miss issues a restore request.
    pub fn restore_history(&mut self, url: &str) {
        if let Some(snapshot) = self.history.lookup(url).cloned() {
            let root = self.history_element();
            let old: Vec<NodeId> = self.tree.children(root).collect();
            for child in old {
                self.on_unmount(child);
                let _ = self.tree.detach(child);
            }
            let fragment = self.html.parse_fragment(&snapshot.content);
            let incoming: Vec<NodeId> = fragment.tree.children(NodeId::ROOT).collect();
            for node in incoming {
                if let Ok(copied) = self.tree.import(&fragment.tree, node) {
                    let _ = self.tree.append_child(root, copied);
                    self.bind_subtree(copied);
                }
            }
            self.title = snapshot.title.clone();
            self.location = self.absolutize(url);
            self.signals.emit(
                &self.tree,
                NodeId::ROOT,
                SignalKind::HistoryRestored { url: normalize_url(url) },
            );
            self.signals.emit(
                &self.tree,
                NodeId::ROOT,
                SignalKind::Scroll { to: ScrollTo::Offset(snapshot.scroll) },
            );
            return;
        }

        // cache miss: fetch the page state from the server
        let root = self.history_element();
        let plan = RequestPlan {
            element: root,
            verb: graft_net::Verb::Get,
            url: url.to_string(),
            target: root,
            params: crate::params::ParamMap::new(),
            headers: graft_net::HeaderMap::new(),
            swap_attr: Some("innerHTML".to_string()),
            push_url: None,
            queue: None,
            history_restore: true,
            polling: false,
        };
        self.location = self.absolutize(url);
        self.issue_plan(plan);
    }

    // ------------------------------------------------------------------
    // internals

    fn fire(&mut self, fire: Fire) {
        let Some(spec) = self.binder.spec(fire) else {
            return;
        };
        let queue = spec.queue;
        let polling = matches!(spec.source, TriggerSource::Poll(_));
        self.issue(fire.element, queue, polling);
    }

    fn issue(&mut self, element: NodeId, queue: Option<QueuePolicy>, polling: bool) {
        if let Some(message) = self.tree.attr(element, "gx-confirm") {
            if let Some(confirm) = &self.confirm {
                if !confirm(message) {
                    return;
                }
            }
        }
        let plan = match build_plan(
            &self.tree,
            &self.config,
            &mut self.signals,
            element,
            queue,
            polling,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::debug!(target: "graft", element = element.0, error = %e, "request not issued");
                return;
            }
        };
        self.issue_plan(plan);
    }

    fn issue_plan(&mut self, plan: RequestPlan) {
        match resolve_sync(&self.tree, &mut self.signals, plan.element, plan.queue) {
            Some(directive) => match self.coordinator.admit(directive, plan) {
                Admission::Dropped | Admission::Queued => {}
                Admission::Proceed {
                    plan,
                    abort_first,
                    mark_abortable,
                } => {
                    if let Some(victim) = abort_first {
                        self.abort_superseded(victim);
                    }
                    self.begin_exchange(plan, directive.governing, mark_abortable);
                }
            },
            None => self.begin_exchange(plan, NodeId::NONE, false),
        }
    }

    fn begin_exchange(&mut self, plan: RequestPlan, governing: NodeId, abortable: bool) {
        if let Some(gate) = &self.request_gate {
            if !gate(&self.tree, &plan) {
                self.resume_queue(governing);
                return;
            }
        }
        let wire = match build_wire_request(&self.tree, &self.config, &self.location, &plan) {
            Ok(wire) => wire,
            Err(e) => {
                self.signals.emit(
                    &self.tree,
                    plan.element,
                    SignalKind::TransportFailure { detail: e.to_string() },
                );
                self.resume_queue(governing);
                return;
            }
        };

        let element = plan.element;
        let id = self.exchanges.begin(plan, governing, abortable);
        if governing.is_some() {
            self.coordinator.record_owner(governing, id, abortable);
        }

        let indicators = self.indicator_targets(element);
        let disabled = self.disable_targets(element);
        for &node in &indicators {
            if let Some(elem) = self.tree.element_mut(node) {
                elem.add_class(&self.config.indicator_class);
            }
        }
        let mut actually_disabled = Vec::new();
        for node in disabled {
            if let Some(elem) = self.tree.element_mut(node) {
                if !elem.has_attr("disabled") {
                    elem.set_attr("disabled", "");
                    actually_disabled.push(node);
                }
            }
        }
        if let Some(exchange) = self.exchanges.get_mut(id) {
            exchange.indicators = indicators;
            exchange.disabled = actually_disabled;
        }

        self.signals.emit(&self.tree, element, SignalKind::BeforeSend);
        tracing::debug!(target: "graft", exchange = id.0, verb = wire.verb.as_str(), url = %wire.url, "request dispatched");
        self.transport.dispatch(id, wire);
    }

    fn process_response(
        &mut self,
        id: ExchangeId,
        plan: RequestPlan,
        governing: NodeId,
        response: WireResponse,
    ) {
        let directives = ResponseDirectives::from_response(&response);
        for name in &directives.trigger_now {
            self.signals.emit(
                &self.tree,
                plan.element,
                SignalKind::Custom { name: name.clone() },
            );
        }

        let disposition = classify(&self.config.response_rules, response.status);
        if let Some(name) = &disposition.event {
            self.signals.emit(
                &self.tree,
                plan.element,
                SignalKind::Custom { name: name.clone() },
            );
        }

        if let Some(url) = directives.redirect {
            self.signals
                .emit(&self.tree, plan.element, SignalKind::Redirect { url });
            self.settle_exchange(governing, id);
            return;
        }
        if directives.refresh {
            self.signals.emit(&self.tree, plan.element, SignalKind::Refresh);
            self.settle_exchange(governing, id);
            return;
        }

        if response.status == self.config.poll_cancel_status {
            self.binder.cancel_polling(&mut self.scheduler, plan.element);
        }

        // an error rule reports the status; whether the body still
        // swaps is the rule's own say
        if disposition.error {
            self.signals.emit(
                &self.tree,
                plan.element,
                SignalKind::ResponseError { status: response.status },
            );
        }
        if !disposition.swap {
            self.settle_exchange(governing, id);
            return;
        }

        // swap path
        let target = match &directives.retarget {
            Some(raw) => match TargetRef::parse(raw).resolve(&self.tree, plan.element) {
                Ok(node) => node,
                Err(_) => {
                    self.signals.emit(
                        &self.tree,
                        plan.element,
                        SignalKind::TargetNotFound { selector: raw.clone() },
                    );
                    self.settle_exchange(governing, id);
                    return;
                }
            },
            None => plan.target,
        };

        let mut issues = Vec::new();
        let spec = match directives.reswap.as_deref().or(plan.swap_attr.as_deref()) {
            Some(raw) => SwapSpec::parse(raw, &mut issues),
            None => SwapSpec::from_style(self.config.default_swap_style.clone()),
        };
        for issue in issues {
            self.signals.emit(
                &self.tree,
                plan.element,
                SignalKind::SyntaxError { detail: issue },
            );
        }

        let mut fragment = self.html.parse_fragment(&response.body);
        if let Some(raw) = &directives.reselect_oob {
            match Selector::parse(raw) {
                Ok(sel) => {
                    for node in query_all(&fragment.tree, NodeId::ROOT, &sel) {
                        if fragment.tree.attr(node, "gx-swap-oob").is_none() {
                            fragment.tree.set_attr(node, "gx-swap-oob", "true");
                        }
                    }
                }
                Err(_) => self.signals.emit(
                    &self.tree,
                    plan.element,
                    SignalKind::SyntaxError {
                        detail: format!("bad GX-Reselect-Oob selector `{raw}`"),
                    },
                ),
            }
        }
        let push_url = resolve_push(
            plan.push_url.as_deref(),
            directives.push_url.as_deref(),
            &self.request_url(&plan),
            plan.history_restore,
        );

        let swap_delay = spec.swap_delay_ms.unwrap_or(self.config.default_swap_delay_ms);
        self.pending_swaps.insert(
            id,
            PendingSwap {
                element: plan.element,
                governing,
                target,
                fragment,
                spec,
                reselect: directives.reselect,
                after_swap: directives.trigger_after_swap,
                after_settle: directives.trigger_after_settle,
                push_url,
                replace_url: directives.replace_url,
            },
        );
        if swap_delay == 0 {
            self.apply_pending_swap(id);
        } else {
            self.scheduler.schedule(swap_delay, Task::ApplySwap { exchange: id });
        }
    }

    fn apply_pending_swap(&mut self, id: ExchangeId) {
        let Some(pending) = self.pending_swaps.remove(&id) else {
            return;
        };
        let result = apply_swap(
            &mut self.tree,
            &self.config,
            &self.extensions,
            &mut self.signals,
            pending.target,
            &pending.fragment,
            &pending.spec,
            pending.reselect.as_deref(),
        );
        match result {
            Ok(applied) => {
                self.signals
                    .emit(&self.tree, pending.element, SignalKind::AfterSwap);
                for name in &pending.after_swap {
                    self.signals.emit(
                        &self.tree,
                        pending.element,
                        SignalKind::Custom { name: name.clone() },
                    );
                }
                let inserted = applied.inserted.clone();
                for node in inserted {
                    self.bind_subtree(node);
                }
                let settle_delay = pending
                    .spec
                    .settle_delay_ms
                    .unwrap_or(self.config.default_settle_delay_ms);
                self.pending_settles.insert(
                    id,
                    PendingSettle {
                        element: pending.element,
                        governing: pending.governing,
                        target: pending.target,
                        applied,
                        after_settle: pending.after_settle,
                        scroll: pending.spec.scroll,
                        show: pending.spec.show,
                        push_url: pending.push_url,
                        replace_url: pending.replace_url,
                    },
                );
                if settle_delay == 0 {
                    self.finish_settle(id);
                } else {
                    self.scheduler
                        .schedule(settle_delay, Task::Settle { exchange: id });
                }
            }
            Err(e) => {
                self.signals.emit(
                    &self.tree,
                    pending.element,
                    SignalKind::SwapFailure { detail: e.to_string() },
                );
                self.settle_exchange(pending.governing, id);
            }
        }
    }

    fn finish_settle(&mut self, id: ExchangeId) {
        let Some(pending) = self.pending_settles.remove(&id) else {
            return;
        };
        for restore in &pending.applied.attr_merges {
            self.tree.set_attr(restore.node, &restore.name, &restore.value);
        }
        if self.config.refresh_title {
            if let Some(title) = &pending.applied.title {
                self.title = Some(title.clone());
            }
        }
        for &node in &pending.applied.inserted {
            self.signals.emit(&self.tree, node, SignalKind::Load);
        }
        self.signals
            .emit(&self.tree, pending.element, SignalKind::AfterSettle);
        for name in &pending.after_settle {
            self.signals.emit(
                &self.tree,
                pending.element,
                SignalKind::Custom { name: name.clone() },
            );
        }

        if let Some(to) = pending.scroll {
            self.signals
                .emit(&self.tree, pending.target, SignalKind::Scroll { to });
        }
        if let Some(selector) = &pending.show {
            if let Ok(sel) = Selector::parse(selector) {
                if let Some(node) = graft_dom::query_first(&self.tree, NodeId::ROOT, &sel) {
                    self.signals
                        .emit(&self.tree, node, SignalKind::Scroll { to: ScrollTo::Top });
                }
            }
        }

        if let Some(url) = pending.replace_url {
            self.move_location(&url, true);
        } else if let Some(url) = pending.push_url {
            self.move_location(&url, false);
        }

        self.settle_exchange(pending.governing, id);
    }

    /// A request admitted under a governing element never dispatched;
    /// give a buffered continuation its turn
    fn resume_queue(&mut self, governing: NodeId) {
        if governing.is_none() {
            return;
        }
        if let Some(next) = self.coordinator.dequeue(governing) {
            self.issue_plan(next);
        }
    }

    fn settle_exchange(&mut self, governing: NodeId, id: ExchangeId) {
        self.exchanges.remove(id);
        if governing.is_none() {
            return;
        }
        // ownership clears before the dequeue so the follow-up admits
        if let Some(next) = self.coordinator.settle(governing, id) {
            self.issue_plan(next);
        }
    }

    /// Record the outgoing page state, then adopt the new URL
    fn move_location(&mut self, url: &str, replace: bool) {
        if !self.config.history_enabled {
            return;
        }
        if !replace {
            let root = self.history_element();
            let snapshot = HistorySnapshot {
                url: self.location.clone(),
                content: inner_html(&self.tree, root),
                title: self.title.clone(),
                scroll: 0.0,
            };
            self.history.record(snapshot);
            self.history.persist(self.storage.as_mut());
        }
        self.location = self.absolutize(url);
        let kind = if replace {
            SignalKind::UrlReplaced { url: normalize_url(url) }
        } else {
            SignalKind::UrlPushed { url: normalize_url(url) }
        };
        self.signals.emit(&self.tree, NodeId::ROOT, kind);
    }

    /// The element whose content history snapshots capture
    fn history_element(&self) -> NodeId {
        self.tree
            .descendants(NodeId::ROOT)
            .find(|&n| self.tree.attr(n, "gx-history-elt").is_some())
            .or_else(|| {
                self.tree
                    .descendants(NodeId::ROOT)
                    .find(|&n| self.tree.tag(n) == Some("body"))
            })
            .unwrap_or(NodeId::ROOT)
    }

    fn absolutize(&self, url: &str) -> String {
        resolve_url(&self.location, url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string())
    }

    fn request_url(&self, plan: &RequestPlan) -> String {
        self.absolutize(&plan.url)
    }

    fn indicator_targets(&self, element: NodeId) -> Vec<NodeId> {
        match inherited_attr(&self.tree, element, "gx-indicator") {
            Some(raw) => Selector::parse(raw)
                .ok()
                .map(|sel| query_all(&self.tree, NodeId::ROOT, &sel))
                .unwrap_or_default(),
            None => vec![element],
        }
    }

    fn disable_targets(&self, element: NodeId) -> Vec<NodeId> {
        match inherited_attr(&self.tree, element, "gx-disable") {
            Some("this") => vec![element],
            Some(raw) => Selector::parse(raw)
                .ok()
                .map(|sel| query_all(&self.tree, NodeId::ROOT, &sel))
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn clear_request_ui(&mut self, indicators: &[NodeId], disabled: &[NodeId]) {
        let class = self.config.indicator_class.clone();
        for &node in indicators {
            if let Some(elem) = self.tree.element_mut(node) {
                elem.remove_class(&class);
            }
        }
        for &node in disabled {
            if let Some(elem) = self.tree.element_mut(node) {
                elem.remove_attr("disabled");
            }
        }
    }

    fn bind_subtree(&mut self, root: NodeId) {
        let mut candidates: Vec<NodeId> = Vec::new();
        if element_is_annotated(&self.tree, root) {
            candidates.push(root);
        }
        for node in self.tree.descendants(root) {
            if element_is_annotated(&self.tree, node) {
                candidates.push(node);
            }
        }
        for element in candidates {
            if !self.binder.is_bound(element) {
                self.binder.bind(
                    &self.tree,
                    &mut self.parser,
                    &mut self.scheduler,
                    &mut self.signals,
                    element,
                );
            }
        }
        self.schedule_scan();
    }

    fn schedule_scan(&mut self) {
        if self.scan_task.is_none() && self.binder.wants_viewport_scans() {
            self.scan_task = Some(
                self.scheduler
                    .schedule(self.config.reveal_poll_interval_ms, Task::RevealScan),
            );
        }
    }
}

/// Does the element carry a verb attribute (optionally with triggers)?
fn element_is_annotated(tree: &DomTree, element: NodeId) -> bool {
    const VERBS: [&str; 5] = ["gx-get", "gx-post", "gx-put", "gx-patch", "gx-delete"];
    VERBS.iter().any(|v| tree.attr(element, v).is_some())
}

/// Decide the history push for a completed exchange. The server
/// directive beats the attribute; restores never push.
fn resolve_push(
    attr: Option<&str>,
    directive: Option<&str>,
    request_url: &str,
    history_restore: bool,
) -> Option<String> {
    if history_restore {
        return None;
    }
    let value = directive.or(attr)?;
    match value {
        "false" => None,
        "true" => Some(request_url.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use graft_net::WireRequest;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Rc<RefCell<Vec<(ExchangeId, WireRequest)>>>,
    }

    impl Transport for RecordingTransport {
        fn dispatch(&mut self, exchange: ExchangeId, request: WireRequest) {
            self.sent.borrow_mut().push((exchange, request));
        }
    }

    fn engine_with(html: &str) -> (Engine, Rc<RefCell<Vec<(ExchangeId, WireRequest)>>>) {
        let transport = RecordingTransport::default();
        let sent = Rc::clone(&transport.sent);
        let mut engine = Engine::new(EngineConfig::default(), Box::new(transport));
        engine.load_document(html, "https://example.test/");
        (engine, sent)
    }

    #[test]
    fn test_click_dispatches_and_swaps() {
        let (mut engine, sent) = engine_with(
            "<button id=\"b\" gx-get=\"/hello\" gx-target=\"#out\">go</button>\
             <div id=\"out\"></div>",
        );
        let button = engine.document().find_by_id("b").unwrap();
        engine.handle_event(&NativeEvent::new("click", button));

        assert_eq!(sent.borrow().len(), 1);
        let (id, request) = sent.borrow()[0].clone();
        assert_eq!(request.url, "https://example.test/hello");
        assert_eq!(request.headers.get("GX-Request"), Some("true"));

        engine.complete(id, Ok(WireResponse::new(200, "<p>hi</p>")));
        engine.advance(100);
        let out = engine.document().find_by_id("out").unwrap();
        assert_eq!(engine.document().text_content(out), "hi");
    }

    #[test]
    fn test_indicator_toggles() {
        let (mut engine, sent) = engine_with("<button id=\"b\" gx-get=\"/x\">go</button>");
        let button = engine.document().find_by_id("b").unwrap();
        engine.handle_event(&NativeEvent::new("click", button));

        let elem = engine.document().element(button).unwrap();
        assert!(elem.has_class("gx-request"));

        let id = sent.borrow()[0].0;
        engine.complete(id, Ok(WireResponse::new(204, "")));
        let elem = engine.document().element(button).unwrap();
        assert!(!elem.has_class("gx-request"));
    }

    #[test]
    fn test_error_status_leaves_document_alone() {
        let (mut engine, sent) = engine_with(
            "<button id=\"b\" gx-get=\"/x\" gx-target=\"#out\">go</button>\
             <div id=\"out\">before</div>",
        );
        let button = engine.document().find_by_id("b").unwrap();
        engine.handle_event(&NativeEvent::new("click", button));
        let id = sent.borrow()[0].0;
        engine.complete(id, Ok(WireResponse::new(500, "<p>boom</p>")));
        engine.advance(100);

        let out = engine.document().find_by_id("out").unwrap();
        assert_eq!(engine.document().text_content(out), "before");
        let signals = engine.drain_signals();
        assert!(signals
            .iter()
            .any(|s| matches!(s.kind, SignalKind::ResponseError { status: 500 })));
    }

    #[test]
    fn test_confirm_handler_can_cancel() {
        let (mut engine, sent) =
            engine_with("<button id=\"b\" gx-delete=\"/x\" gx-confirm=\"sure?\">go</button>");
        engine.set_confirm_handler(|_| false);
        let button = engine.document().find_by_id("b").unwrap();
        engine.handle_event(&NativeEvent::new("click", button));
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn test_retarget_header() {
        let (mut engine, sent) = engine_with(
            "<button id=\"b\" gx-get=\"/x\" gx-target=\"#a\">go</button>\
             <div id=\"a\">a</div><div id=\"c\">c</div>",
        );
        let button = engine.document().find_by_id("b").unwrap();
        engine.handle_event(&NativeEvent::new("click", button));
        let id = sent.borrow()[0].0;

        let mut response = WireResponse::new(200, "<p>moved</p>");
        response.headers.set("GX-Retarget", "#c");
        engine.complete(id, Ok(response));
        engine.advance(100);

        let a = engine.document().find_by_id("a").unwrap();
        let c = engine.document().find_by_id("c").unwrap();
        assert_eq!(engine.document().text_content(a), "a");
        assert_eq!(engine.document().text_content(c), "moved");
    }

    #[test]
    fn test_push_url_records_snapshot() {
        let (mut engine, sent) = engine_with(
            "<button id=\"b\" gx-get=\"/next\" gx-target=\"#out\" gx-push-url=\"true\">go</button>\
             <div id=\"out\">old page</div>",
        );
        let button = engine.document().find_by_id("b").unwrap();
        engine.handle_event(&NativeEvent::new("click", button));
        let id = sent.borrow()[0].0;
        engine.complete(id, Ok(WireResponse::new(200, "<p>new page</p>")));
        engine.advance(100);

        assert_eq!(engine.location(), "https://example.test/next");
        let signals = engine.drain_signals();
        assert!(signals
            .iter()
            .any(|s| matches!(&s.kind, SignalKind::UrlPushed { url } if url == "/next")));
        // the outgoing page was snapshotted under the old URL
        assert!(engine.history.lookup("https://example.test/").is_some());
    }
}
