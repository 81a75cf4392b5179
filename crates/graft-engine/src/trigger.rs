//! Trigger attribute parsing
//!
//! A trigger attribute is a comma-separated list of clauses; each
//! clause names an event source and carries modifiers. Parses are
//! cached per attribute string, so two elements with the same
//! attribute share one spec slice.

use std::collections::HashMap;
use std::sync::Arc;

use graft_dom::{forms, DomTree, NodeId};

use crate::coordinate::QueuePolicy;
use crate::target::TargetRef;

/// What starts a trigger clause
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSource {
    /// A named native event
    Event(String),
    /// `every <interval>`: fire repeatedly on the clock
    Poll(u64),
    /// Fire once when the element enters the tree
    Load,
    /// Fire when the element's bounds intersect the root by the
    /// configured threshold
    Intersect,
    /// Fire the first time the element becomes visible
    Reveal,
}

/// One parsed trigger clause
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSpec {
    pub source: TriggerSource,
    /// Fire at most once for the element's lifetime
    pub once: bool,
    /// Fire only when the control's value changed since the last check
    pub changed: bool,
    /// Stop the native event from reaching enclosing bindings
    pub consume: bool,
    /// Debounce window in milliseconds
    pub delay_ms: u64,
    /// Minimum spacing between firings in milliseconds
    pub throttle_ms: u64,
    /// Same-element queueing policy when a request is already active
    pub queue: Option<QueuePolicy>,
    /// Listen on another element instead of the annotated one
    pub from: Option<TargetRef>,
    /// Only accept events whose native target matches this selector
    pub target_filter: Option<String>,
    /// Intersection root selector
    pub root: Option<String>,
    /// Intersection visibility ratio, 0.0 to 1.0
    pub threshold: Option<f64>,
    /// Named guard predicate to evaluate before firing
    pub guard: Option<String>,
}

impl TriggerSpec {
    fn event(name: &str) -> Self {
        Self::with_source(TriggerSource::Event(name.to_string()))
    }

    fn with_source(source: TriggerSource) -> Self {
        TriggerSpec {
            source,
            once: false,
            changed: false,
            consume: false,
            delay_ms: 0,
            throttle_ms: 0,
            queue: None,
            from: None,
            target_filter: None,
            root: None,
            threshold: None,
            guard: None,
        }
    }
}

/// Result of parsing one attribute string
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub specs: Arc<[TriggerSpec]>,
    /// Human-readable descriptions of skipped clauses or tokens
    pub issues: Arc<[String]>,
}

/// Caching trigger parser
#[derive(Debug, Default)]
pub struct TriggerParser {
    cache: HashMap<String, ParseOutcome>,
}

impl TriggerParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an attribute value, reusing a cached outcome for an
    /// identical string
    pub fn parse(&mut self, raw: &str) -> ParseOutcome {
        if let Some(cached) = self.cache.get(raw) {
            return cached.clone();
        }
        let outcome = parse_uncached(raw);
        self.cache.insert(raw.to_string(), outcome.clone());
        outcome
    }

    /// Default spec for an element with no trigger attribute: submit
    /// for forms, click for submit-like controls, change for
    /// value-editing controls, click for everything else.
    pub fn default_specs(tree: &DomTree, element: NodeId) -> Arc<[TriggerSpec]> {
        let event = if forms::is_form(tree, element) {
            "submit"
        } else if forms::is_submitter(tree, element) {
            "click"
        } else if forms::is_form_control(tree, element) {
            let kind = tree.attr(element, "type").unwrap_or("text");
            if kind.eq_ignore_ascii_case("checkbox") || kind.eq_ignore_ascii_case("radio") {
                "click"
            } else {
                "change"
            }
        } else {
            "click"
        };
        Arc::from(vec![TriggerSpec::event(event)])
    }
}

fn parse_uncached(raw: &str) -> ParseOutcome {
    let mut specs = Vec::new();
    let mut issues = Vec::new();
    for clause in split_clauses(raw) {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        match parse_clause(clause, &mut issues) {
            Some(spec) => specs.push(spec),
            None => issues.push(format!("unparseable trigger clause `{clause}`")),
        }
    }
    ParseOutcome {
        specs: Arc::from(specs),
        issues: Arc::from(issues),
    }
}

/// Split on commas that sit outside brackets and quotes
fn split_clauses(raw: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in raw.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    clauses.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.trim().is_empty() {
        clauses.push(current);
    }
    clauses
}

fn parse_clause(clause: &str, issues: &mut Vec<String>) -> Option<TriggerSpec> {
    let tokens: Vec<&str> = clause.split_whitespace().collect();
    let mut iter = tokens.iter().peekable();
    let head = *iter.next()?;

    let mut spec = if head == "every" {
        let interval = *iter.next()?;
        let ms = parse_duration(interval)?;
        TriggerSpec::with_source(TriggerSource::Poll(ms))
    } else if head == "load" {
        TriggerSpec::with_source(TriggerSource::Load)
    } else if head == "revealed" {
        TriggerSpec::with_source(TriggerSource::Reveal)
    } else if head == "intersect" {
        TriggerSpec::with_source(TriggerSource::Intersect)
    } else {
        // `name[guard]` attaches a named predicate to the event
        let (name, guard) = match head.split_once('[') {
            Some((name, rest)) => {
                let guard = rest.strip_suffix(']')?;
                (name, Some(guard.to_string()))
            }
            None => (head, None),
        };
        if name.is_empty() {
            return None;
        }
        let mut spec = TriggerSpec::event(name);
        spec.guard = guard;
        spec
    };

    while let Some(token) = iter.next() {
        match *token {
            "once" => spec.once = true,
            "changed" => spec.changed = true,
            "consume" => spec.consume = true,
            "queue" => spec.queue = Some(QueuePolicy::Last),
            _ => {
                if let Some(value) = token.strip_prefix("delay:") {
                    match parse_duration(value) {
                        Some(ms) => spec.delay_ms = ms,
                        None => issues.push(format!("bad delay `{value}`")),
                    }
                } else if let Some(value) = token.strip_prefix("throttle:") {
                    match parse_duration(value) {
                        Some(ms) => spec.throttle_ms = ms,
                        None => issues.push(format!("bad throttle `{value}`")),
                    }
                } else if let Some(value) = token.strip_prefix("queue:") {
                    match QueuePolicy::parse(value) {
                        Some(policy) => spec.queue = Some(policy),
                        None => issues.push(format!("bad queue policy `{value}`")),
                    }
                } else if let Some(value) = token.strip_prefix("from:") {
                    // closest/find take the following token as selector
                    let expr = if value == "closest" || value == "find" {
                        match iter.next() {
                            Some(sel) => format!("{value} {sel}"),
                            None => {
                                issues.push(format!("`from:{value}` missing a selector"));
                                continue;
                            }
                        }
                    } else {
                        value.to_string()
                    };
                    spec.from = Some(TargetRef::parse(&expr));
                } else if let Some(value) = token.strip_prefix("target:") {
                    spec.target_filter = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("root:") {
                    spec.root = Some(value.to_string());
                } else if let Some(value) = token.strip_prefix("threshold:") {
                    match value.parse::<f64>() {
                        Ok(ratio) if (0.0..=1.0).contains(&ratio) => {
                            spec.threshold = Some(ratio)
                        }
                        _ => issues.push(format!("bad threshold `{value}`")),
                    }
                } else {
                    issues.push(format!("unknown trigger modifier `{token}`"));
                }
            }
        }
    }
    Some(spec)
}

/// `500ms`, `2s`, or a bare millisecond count
pub fn parse_duration(raw: &str) -> Option<u64> {
    if let Some(value) = raw.strip_suffix("ms") {
        return value.trim().parse().ok();
    }
    if let Some(value) = raw.strip_suffix('s') {
        let seconds: f64 = value.trim().parse().ok()?;
        if seconds < 0.0 {
            return None;
        }
        return Some((seconds * 1000.0) as u64);
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_shares_specs() {
        let mut parser = TriggerParser::new();
        let a = parser.parse("click once");
        let b = parser.parse("click once");
        assert!(Arc::ptr_eq(&a.specs, &b.specs));
    }

    #[test]
    fn test_event_with_modifiers() {
        let mut parser = TriggerParser::new();
        let out = parser.parse("keyup changed delay:500ms, submit");
        assert!(out.issues.is_empty());
        assert_eq!(out.specs.len(), 2);
        let keyup = &out.specs[0];
        assert_eq!(keyup.source, TriggerSource::Event("keyup".to_string()));
        assert!(keyup.changed);
        assert_eq!(keyup.delay_ms, 500);
        assert_eq!(out.specs[1].source, TriggerSource::Event("submit".to_string()));
    }

    #[test]
    fn test_poll() {
        let mut parser = TriggerParser::new();
        let out = parser.parse("every 2s");
        assert_eq!(out.specs[0].source, TriggerSource::Poll(2000));
    }

    #[test]
    fn test_guard_syntax() {
        let mut parser = TriggerParser::new();
        let out = parser.parse("click[ctrlKey]");
        assert_eq!(out.specs[0].guard.as_deref(), Some("ctrlKey"));
        assert_eq!(
            out.specs[0].source,
            TriggerSource::Event("click".to_string())
        );
    }

    #[test]
    fn test_from_closest_consumes_selector() {
        let mut parser = TriggerParser::new();
        let out = parser.parse("click from:closest form");
        assert_eq!(
            out.specs[0].from,
            Some(TargetRef::Closest("form".to_string()))
        );
    }

    #[test]
    fn test_unknown_modifier_is_reported_not_fatal() {
        let mut parser = TriggerParser::new();
        let out = parser.parse("click zorp once");
        assert_eq!(out.specs.len(), 1);
        assert!(out.specs[0].once);
        assert_eq!(out.issues.len(), 1);
        assert!(out.issues[0].contains("zorp"));
    }

    #[test]
    fn test_comma_inside_brackets_not_split() {
        let clauses = split_clauses("click[a,b], keyup");
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0], "click[a,b]");
    }

    #[test]
    fn test_default_specs_per_element() {
        let mut tree = DomTree::new();
        let form = tree.create_element("form");
        let text = tree.create_element("input");
        let submit = tree.create_element("input");
        tree.set_attr(submit, "type", "submit");
        let check = tree.create_element("input");
        tree.set_attr(check, "type", "checkbox");
        let button = tree.create_element("button");
        let div = tree.create_element("div");
        for node in [form, text, submit, check, button, div] {
            tree.append_child(NodeId::ROOT, node).unwrap();
        }

        let event = |n| match &TriggerParser::default_specs(&tree, n)[0].source {
            TriggerSource::Event(name) => name.clone(),
            other => panic!("unexpected source {other:?}"),
        };
        assert_eq!(event(form), "submit");
        assert_eq!(event(text), "change");
        assert_eq!(event(submit), "click");
        assert_eq!(event(check), "click");
        assert_eq!(event(button), "click");
        assert_eq!(event(div), "click");
    }
}
