//! Event binding
//!
//! Connects native events fed in by the host to the trigger specs
//! parsed from markup. Each bound element carries one state machine
//! per trigger clause tracking once/changed/throttle/debounce
//! progress; the binder decides which clauses fire, the engine turns
//! firings into requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use graft_dom::{forms, DomTree, NodeId, Rect, Selector};

use crate::registry::GuardRegistry;
use crate::scheduler::{Scheduler, Task, TaskId};
use crate::signal::{SignalKind, SignalLog};
use crate::trigger::{TriggerParser, TriggerSource, TriggerSpec};

/// A host-delivered event: a name and the element it happened on
#[derive(Debug, Clone)]
pub struct NativeEvent {
    pub name: String,
    pub target: NodeId,
}

impl NativeEvent {
    pub fn new(name: &str, target: NodeId) -> Self {
        Self {
            name: name.to_string(),
            target,
        }
    }
}

/// Per-clause runtime state
#[derive(Debug, Default)]
struct TriggerState {
    fired_once: bool,
    last_value: Option<String>,
    last_generation: Option<u64>,
    delay_task: Option<TaskId>,
    throttled_until: Option<u64>,
    poll_task: Option<TaskId>,
    poll_cancelled: bool,
    revealed: bool,
    intersecting: bool,
}

#[derive(Debug)]
struct Binding {
    specs: Arc<[TriggerSpec]>,
    states: Vec<TriggerState>,
}

/// A clause that decided to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    pub element: NodeId,
    pub spec_index: usize,
}

/// What an event did
#[derive(Debug, Default)]
pub struct EventOutcome {
    pub fires: Vec<Fire>,
    /// A consume modifier matched; enclosing bindings were skipped
    pub consumed: bool,
}

/// Bound elements and their trigger state
#[derive(Debug, Default)]
pub struct Binder {
    bindings: BTreeMap<NodeId, Binding>,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self, element: NodeId) -> bool {
        self.bindings.contains_key(&element)
    }

    /// Elements with reveal or intersect clauses pending a scan
    pub fn wants_viewport_scans(&self) -> bool {
        self.bindings.values().any(|b| {
            b.specs.iter().any(|s| {
                matches!(s.source, TriggerSource::Reveal | TriggerSource::Intersect)
            })
        })
    }

    /// Parse the element's trigger attribute and register it. Load and
    /// poll clauses schedule their first task immediately.
    pub fn bind(
        &mut self,
        tree: &DomTree,
        parser: &mut TriggerParser,
        scheduler: &mut Scheduler,
        signals: &mut SignalLog,
        element: NodeId,
    ) {
        let specs = match tree.attr(element, "gx-trigger") {
            Some(raw) => {
                let outcome = parser.parse(raw);
                for issue in outcome.issues.iter() {
                    signals.emit(
                        tree,
                        element,
                        SignalKind::SyntaxError {
                            detail: issue.clone(),
                        },
                    );
                }
                outcome.specs
            }
            None => TriggerParser::default_specs(tree, element),
        };

        let mut states: Vec<TriggerState> = specs.iter().map(|_| TriggerState::default()).collect();
        for (index, spec) in specs.iter().enumerate() {
            match spec.source {
                TriggerSource::Load => {
                    scheduler.schedule(
                        spec.delay_ms,
                        Task::LoadFire {
                            element,
                            spec: index,
                        },
                    );
                }
                TriggerSource::Poll(interval) => {
                    let task = scheduler.schedule(
                        interval,
                        Task::Poll {
                            element,
                            spec: index,
                        },
                    );
                    states[index].poll_task = Some(task);
                }
                _ => {}
            }
        }
        tracing::debug!(target: "graft", element = element.0, clauses = specs.len(), "element bound");
        self.bindings.insert(element, Binding { specs, states });
    }

    /// Drop a binding and cancel its scheduled work
    pub fn unbind(&mut self, scheduler: &mut Scheduler, element: NodeId) {
        if let Some(binding) = self.bindings.remove(&element) {
            for state in binding.states {
                if let Some(task) = state.delay_task {
                    scheduler.cancel(task);
                }
                if let Some(task) = state.poll_task {
                    scheduler.cancel(task);
                }
            }
        }
    }

    pub fn bound_elements(&self) -> Vec<NodeId> {
        self.bindings.keys().copied().collect()
    }

    /// Route a native event to matching clauses. Bindings closer to
    /// the event target run first so a consume modifier can stop
    /// enclosing ones.
    pub fn on_event(
        &mut self,
        tree: &DomTree,
        scheduler: &mut Scheduler,
        guards: &GuardRegistry,
        signals: &mut SignalLog,
        event: &NativeEvent,
    ) -> EventOutcome {
        let mut outcome = EventOutcome::default();

        // order bindings by proximity: the target itself, then its
        // ancestors, then listeners attached elsewhere via from:
        let mut ordered: Vec<NodeId> = Vec::new();
        if self.bindings.contains_key(&event.target) {
            ordered.push(event.target);
        }
        for ancestor in tree.ancestors(event.target) {
            if self.bindings.contains_key(&ancestor) {
                ordered.push(ancestor);
            }
        }
        for &element in self.bindings.keys() {
            if !ordered.contains(&element) {
                ordered.push(element);
            }
        }

        for element in ordered {
            if outcome.consumed {
                break;
            }
            let Some(binding) = self.bindings.get(&element) else {
                continue;
            };
            let specs = Arc::clone(&binding.specs);
            for (index, spec) in specs.iter().enumerate() {
                let TriggerSource::Event(name) = &spec.source else {
                    continue;
                };
                if name != &event.name {
                    continue;
                }
                if !scope_accepts(tree, element, spec, event.target) {
                    continue;
                }
                if let Some(filter) = &spec.target_filter {
                    match Selector::parse(filter) {
                        Ok(sel) => {
                            if !sel.matches(tree, event.target) {
                                continue;
                            }
                        }
                        Err(e) => {
                            signals.emit(
                                tree,
                                element,
                                SignalKind::SyntaxError {
                                    detail: format!("bad target filter: {e}"),
                                },
                            );
                            continue;
                        }
                    }
                }

                let accepted =
                    self.run_clause(tree, scheduler, guards, signals, element, index, spec);
                match accepted {
                    ClauseOutcome::Fire => outcome.fires.push(Fire {
                        element,
                        spec_index: index,
                    }),
                    ClauseOutcome::Deferred => {}
                    ClauseOutcome::Skipped => continue,
                }
                if spec.consume {
                    outcome.consumed = true;
                }
            }
        }
        outcome
    }

    /// A debounce window elapsed; fire if the binding still exists
    pub fn debounce_elapsed(&mut self, element: NodeId, spec_index: usize) -> Option<Fire> {
        let binding = self.bindings.get_mut(&element)?;
        let state = binding.states.get_mut(spec_index)?;
        state.delay_task = None;
        Some(Fire {
            element,
            spec_index,
        })
    }

    /// A poll interval elapsed. Returns the firing plus the interval to
    /// reschedule at, unless polling was cancelled.
    pub fn poll_elapsed(
        &mut self,
        tree: &DomTree,
        scheduler: &mut Scheduler,
        element: NodeId,
        spec_index: usize,
    ) -> Option<Fire> {
        if !tree.is_attached(element) {
            self.unbind(scheduler, element);
            return None;
        }
        let binding = self.bindings.get_mut(&element)?;
        let spec = binding.specs.get(spec_index)?;
        let TriggerSource::Poll(interval) = spec.source else {
            return None;
        };
        let state = binding.states.get_mut(spec_index)?;
        if state.poll_cancelled {
            state.poll_task = None;
            return None;
        }
        state.poll_task = Some(scheduler.schedule(
            interval,
            Task::Poll {
                element,
                spec: spec_index,
            },
        ));
        Some(Fire {
            element,
            spec_index,
        })
    }

    /// Stop every poll clause on an element (cancel status received)
    pub fn cancel_polling(&mut self, scheduler: &mut Scheduler, element: NodeId) {
        if let Some(binding) = self.bindings.get_mut(&element) {
            for state in &mut binding.states {
                state.poll_cancelled = true;
                if let Some(task) = state.poll_task.take() {
                    scheduler.cancel(task);
                }
            }
        }
    }

    /// A load task came due; fire unless the element left the tree
    pub fn load_elapsed(&mut self, tree: &DomTree, element: NodeId, spec_index: usize) -> Option<Fire> {
        let binding = self.bindings.get(&element)?;
        binding.specs.get(spec_index)?;
        if !tree.is_attached(element) {
            return None;
        }
        Some(Fire {
            element,
            spec_index,
        })
    }

    /// Check reveal/intersect clauses against current geometry
    pub fn scan_viewport(
        &mut self,
        tree: &DomTree,
        bounds: &BTreeMap<NodeId, Rect>,
        viewport: Rect,
    ) -> Vec<Fire> {
        let mut fires = Vec::new();
        for (&element, binding) in self.bindings.iter_mut() {
            if !tree.is_attached(element) {
                continue;
            }
            let Some(rect) = bounds.get(&element) else {
                continue;
            };
            for (index, spec) in binding.specs.iter().enumerate() {
                let state = &mut binding.states[index];
                match spec.source {
                    TriggerSource::Reveal => {
                        if state.revealed || state.fired_once {
                            continue;
                        }
                        if rect.intersects(&viewport) {
                            state.revealed = true;
                            state.fired_once = true;
                            fires.push(Fire {
                                element,
                                spec_index: index,
                            });
                        }
                    }
                    TriggerSource::Intersect => {
                        let root_rect = spec
                            .root
                            .as_deref()
                            .and_then(|sel| Selector::parse(sel).ok())
                            .and_then(|sel| graft_dom::query_first(tree, NodeId::ROOT, &sel))
                            .and_then(|n| bounds.get(&n).copied())
                            .unwrap_or(viewport);
                        let ratio = rect.visible_ratio(&root_rect);
                        let threshold = spec.threshold.unwrap_or(0.0);
                        let visible = if threshold == 0.0 {
                            ratio > 0.0
                        } else {
                            ratio >= threshold
                        };
                        if visible && !state.intersecting {
                            state.intersecting = true;
                            if spec.once && state.fired_once {
                                continue;
                            }
                            state.fired_once = true;
                            fires.push(Fire {
                                element,
                                spec_index: index,
                            });
                        } else if !visible {
                            state.intersecting = false;
                        }
                    }
                    _ => {}
                }
            }
        }
        fires
    }

    /// The spec behind a firing
    pub fn spec(&self, fire: Fire) -> Option<&TriggerSpec> {
        self.bindings
            .get(&fire.element)
            .and_then(|b| b.specs.get(fire.spec_index))
    }

    fn run_clause(
        &mut self,
        tree: &DomTree,
        scheduler: &mut Scheduler,
        guards: &GuardRegistry,
        signals: &mut SignalLog,
        element: NodeId,
        index: usize,
        spec: &TriggerSpec,
    ) -> ClauseOutcome {
        let binding = match self.bindings.get_mut(&element) {
            Some(b) => b,
            None => return ClauseOutcome::Skipped,
        };
        let state = &mut binding.states[index];

        if spec.once && state.fired_once {
            return ClauseOutcome::Skipped;
        }

        if spec.changed && !value_changed(tree, element, state) {
            return ClauseOutcome::Skipped;
        }

        if let Some(guard) = &spec.guard {
            match guards.evaluate(guard, tree, element) {
                Ok(true) => {}
                Ok(false) => return ClauseOutcome::Skipped,
                Err(e) => {
                    // a broken guard must not silently disable the UI
                    signals.emit(
                        tree,
                        element,
                        SignalKind::GuardFailure {
                            guard: guard.clone(),
                            detail: e.to_string(),
                        },
                    );
                }
            }
        }

        if spec.throttle_ms > 0 {
            let now = scheduler.now();
            if let Some(until) = state.throttled_until {
                if now < until {
                    return ClauseOutcome::Skipped;
                }
            }
            state.throttled_until = Some(now + spec.throttle_ms);
        }

        state.fired_once = true;

        if spec.delay_ms > 0 {
            // debounce: only the last event in the window fires
            if let Some(task) = state.delay_task.take() {
                scheduler.cancel(task);
            }
            state.delay_task = Some(scheduler.schedule(
                spec.delay_ms,
                Task::DebounceFire {
                    element,
                    spec: index,
                },
            ));
            return ClauseOutcome::Deferred;
        }
        ClauseOutcome::Fire
    }
}

enum ClauseOutcome {
    Fire,
    Deferred,
    Skipped,
}

/// Does the clause's listening scope cover the event target?
fn scope_accepts(tree: &DomTree, element: NodeId, spec: &TriggerSpec, target: NodeId) -> bool {
    let root = match &spec.from {
        Some(reference) => match reference.resolve(tree, element) {
            Ok(node) => node,
            Err(_) => return false,
        },
        None => element,
    };
    target == root || tree.ancestors(target).any(|a| a == root)
}

/// Did the control's value change since the last accepted check?
fn value_changed(tree: &DomTree, element: NodeId, state: &mut TriggerState) -> bool {
    if let Some(generation) = forms::selection_generation(tree, element) {
        let changed = state.last_generation != Some(generation);
        state.last_generation = Some(generation);
        return changed;
    }
    let current = forms::current_value(tree, element);
    let changed = state.last_value != current;
    state.last_value = current;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (DomTree, NodeId, TriggerParser, Scheduler, SignalLog, GuardRegistry) {
        let mut tree = DomTree::new();
        let body = tree.create_element("body");
        tree.append_child(NodeId::ROOT, body).unwrap();
        let input = tree.create_element("input");
        tree.set_attr(input, "name", "q");
        tree.append_child(body, input).unwrap();
        (
            tree,
            input,
            TriggerParser::new(),
            Scheduler::new(),
            SignalLog::new(),
            GuardRegistry::new(),
        )
    }

    #[test]
    fn test_once_fires_one_time() {
        let (mut tree, input, mut parser, mut sched, mut signals, guards) = setup();
        tree.set_attr(input, "gx-trigger", "click once");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let event = NativeEvent::new("click", input);
        let first = binder.on_event(&tree, &mut sched, &guards, &mut signals, &event);
        assert_eq!(first.fires.len(), 1);
        let second = binder.on_event(&tree, &mut sched, &guards, &mut signals, &event);
        assert!(second.fires.is_empty());
    }

    #[test]
    fn test_changed_requires_new_value() {
        let (mut tree, input, mut parser, mut sched, mut signals, guards) = setup();
        tree.set_attr(input, "gx-trigger", "keyup changed");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let event = NativeEvent::new("keyup", input);
        forms::set_value(&mut tree, input, "a");
        assert_eq!(
            binder
                .on_event(&tree, &mut sched, &guards, &mut signals, &event)
                .fires
                .len(),
            1
        );
        // same value: no fire
        assert!(binder
            .on_event(&tree, &mut sched, &guards, &mut signals, &event)
            .fires
            .is_empty());
        forms::set_value(&mut tree, input, "ab");
        assert_eq!(
            binder
                .on_event(&tree, &mut sched, &guards, &mut signals, &event)
                .fires
                .len(),
            1
        );
    }

    #[test]
    fn test_debounce_defers_and_collapses() {
        let (mut tree, input, mut parser, mut sched, mut signals, guards) = setup();
        tree.set_attr(input, "gx-trigger", "keyup delay:500ms");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let event = NativeEvent::new("keyup", input);
        assert!(binder
            .on_event(&tree, &mut sched, &guards, &mut signals, &event)
            .fires
            .is_empty());
        sched.advance(200);
        assert!(binder
            .on_event(&tree, &mut sched, &guards, &mut signals, &event)
            .fires
            .is_empty());

        // only the rescheduled window releases one task
        assert!(sched.advance(500).is_empty());
        let due = sched.advance(700);
        assert_eq!(
            due,
            vec![Task::DebounceFire {
                element: input,
                spec: 0
            }]
        );
        assert!(binder.debounce_elapsed(input, 0).is_some());
    }

    #[test]
    fn test_throttle_leading_edge() {
        let (mut tree, input, mut parser, mut sched, mut signals, guards) = setup();
        tree.set_attr(input, "gx-trigger", "click throttle:1s");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let event = NativeEvent::new("click", input);
        assert_eq!(
            binder
                .on_event(&tree, &mut sched, &guards, &mut signals, &event)
                .fires
                .len(),
            1
        );
        sched.advance(500);
        assert!(binder
            .on_event(&tree, &mut sched, &guards, &mut signals, &event)
            .fires
            .is_empty());
        sched.advance(1100);
        assert_eq!(
            binder
                .on_event(&tree, &mut sched, &guards, &mut signals, &event)
                .fires
                .len(),
            1
        );
    }

    #[test]
    fn test_from_scope() {
        let (mut tree, input, mut parser, mut sched, mut signals, guards) = setup();
        let body = tree.parent(input).unwrap();
        let listener = tree.create_element("div");
        tree.set_attr(listener, "gx-trigger", "keyup from:body");
        tree.append_child(body, listener).unwrap();
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, listener);

        // event on the input, listener elsewhere
        let event = NativeEvent::new("keyup", input);
        let outcome = binder.on_event(&tree, &mut sched, &guards, &mut signals, &event);
        assert_eq!(outcome.fires, vec![Fire { element: listener, spec_index: 0 }]);
    }

    #[test]
    fn test_consume_stops_ancestors() {
        let (mut tree, input, mut parser, mut sched, mut signals, guards) = setup();
        let body = tree.parent(input).unwrap();
        tree.set_attr(body, "gx-trigger", "click");
        tree.set_attr(input, "gx-trigger", "click consume");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, body);
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let event = NativeEvent::new("click", input);
        let outcome = binder.on_event(&tree, &mut sched, &guards, &mut signals, &event);
        assert!(outcome.consumed);
        assert_eq!(outcome.fires, vec![Fire { element: input, spec_index: 0 }]);
    }

    #[test]
    fn test_poll_binding_schedules() {
        let (mut tree, input, mut parser, mut sched, mut signals, _) = setup();
        tree.set_attr(input, "gx-trigger", "every 2s");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let due = sched.advance(2000);
        assert_eq!(due, vec![Task::Poll { element: input, spec: 0 }]);
        let fire = binder.poll_elapsed(&tree, &mut sched, input, 0);
        assert!(fire.is_some());
        // rescheduled
        assert_eq!(sched.advance(4000).len(), 1);

        binder.cancel_polling(&mut sched, input);
        let fire = binder.poll_elapsed(&tree, &mut sched, input, 0);
        assert!(fire.is_none());
        assert!(sched.advance(10_000).is_empty());
    }

    #[test]
    fn test_reveal_scan() {
        let (mut tree, input, mut parser, mut sched, mut signals, _) = setup();
        tree.set_attr(input, "gx-trigger", "revealed");
        let mut binder = Binder::new();
        binder.bind(&tree, &mut parser, &mut sched, &mut signals, input);

        let viewport = Rect::from_xywh(0.0, 0.0, 800.0, 600.0);
        let mut bounds = BTreeMap::new();
        bounds.insert(input, Rect::from_xywh(0.0, 1000.0, 100.0, 50.0));
        assert!(binder.scan_viewport(&tree, &bounds, viewport).is_empty());

        // scrolled into view
        bounds.insert(input, Rect::from_xywh(0.0, 500.0, 100.0, 50.0));
        assert_eq!(binder.scan_viewport(&tree, &bounds, viewport).len(), 1);
        // reveal fires once
        assert!(binder.scan_viewport(&tree, &bounds, viewport).is_empty());
    }
}
