//! In-flight exchange tracking
//!
//! An exchange is one request/response cycle. The engine hands the
//! wire request to the host's [`Transport`] and the host later calls
//! back with the outcome; everything needed to process that outcome is
//! kept in the [`ExchangeTable`] keyed by [`ExchangeId`].

use std::collections::BTreeMap;

use graft_dom::{DomTree, NodeId};
use graft_net::{HeaderMap, WireRequest};
use thiserror::Error;
use url::Url;

use crate::config::EngineConfig;
use crate::coordinate::RequestPlan;

/// Monotonic exchange identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeId(pub u64);

/// Where an exchange is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    /// Dispatched, waiting for the transport
    Sending,
    /// Response received, swap/settle work pending on the clock
    Settling,
    /// Aborted before completion
    Aborted,
}

/// One tracked request/response cycle
#[derive(Debug)]
pub struct Exchange {
    pub id: ExchangeId,
    pub plan: RequestPlan,
    /// Element whose request slot this exchange occupies
    pub governing: NodeId,
    /// May be displaced by a later request under the replace policy
    pub abortable: bool,
    pub phase: ExchangePhase,
    /// Elements carrying the in-flight indicator class
    pub indicators: Vec<NodeId>,
    /// Elements disabled for the duration of the exchange
    pub disabled: Vec<NodeId>,
}

/// Why the transport could not deliver a response
#[derive(Debug, Clone, Error)]
pub enum TransportFailure {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

/// Host-supplied request dispatcher. Implementations start the actual
/// network call and later feed the outcome back through
/// [`crate::Engine::complete`].
pub trait Transport {
    fn dispatch(&mut self, exchange: ExchangeId, request: WireRequest);
}

/// Active exchanges
#[derive(Debug, Default)]
pub struct ExchangeTable {
    next: u64,
    active: BTreeMap<ExchangeId, Exchange>,
}

impl ExchangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and track a new exchange
    pub fn begin(&mut self, plan: RequestPlan, governing: NodeId, abortable: bool) -> ExchangeId {
        let id = ExchangeId(self.next);
        self.next += 1;
        self.active.insert(
            id,
            Exchange {
                id,
                plan,
                governing,
                abortable,
                phase: ExchangePhase::Sending,
                indicators: Vec::new(),
                disabled: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: ExchangeId) -> Option<&Exchange> {
        self.active.get(&id)
    }

    pub fn get_mut(&mut self, id: ExchangeId) -> Option<&mut Exchange> {
        self.active.get_mut(&id)
    }

    pub fn remove(&mut self, id: ExchangeId) -> Option<Exchange> {
        self.active.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn ids(&self) -> Vec<ExchangeId> {
        self.active.keys().copied().collect()
    }
}

/// Resolve a possibly relative request URL against the current location
pub fn resolve_url(location: &str, raw: &str) -> Result<Url, url::ParseError> {
    match Url::parse(raw) {
        Ok(absolute) => Ok(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(location)?;
            base.join(raw)
        }
        Err(e) => Err(e),
    }
}

#[derive(Debug, Error)]
pub enum RequestBuildError {
    #[error("invalid request URL `{url}`: {source}")]
    Url {
        url: String,
        source: url::ParseError,
    },
}

/// Turn a plan into the wire request the transport will carry,
/// attaching the request header protocol.
pub fn build_wire_request(
    tree: &DomTree,
    config: &EngineConfig,
    location: &str,
    plan: &RequestPlan,
) -> Result<WireRequest, RequestBuildError> {
    let mut url = resolve_url(location, &plan.url).map_err(|source| RequestBuildError::Url {
        url: plan.url.clone(),
        source,
    })?;

    let mut headers = HeaderMap::new();
    headers.set("GX-Request", "true");
    if let Some(id) = tree.attr(plan.element, "id") {
        headers.set("GX-Trigger", id);
    }
    if let Some(name) = tree.attr(plan.element, "name") {
        headers.set("GX-Trigger-Name", name);
    }
    if let Some(target_id) = tree.attr(plan.target, "id") {
        headers.set("GX-Target", target_id);
    }
    headers.set("GX-Current-URL", location);
    if plan.history_restore {
        headers.set("GX-History-Restore-Request", "true");
    }
    for (name, value) in plan.headers.iter() {
        headers.set(name, value);
    }

    let payload = plan.params.to_form_payload();
    let body = if plan.verb.is_get() {
        let query = payload.to_query_string();
        if !query.is_empty() {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                _ => query,
            };
            url.set_query(Some(&merged));
        }
        None
    } else if payload.is_empty() {
        None
    } else {
        let body = payload.to_body();
        headers.set("Content-Type", &body.content_type);
        Some(body)
    };

    Ok(WireRequest {
        verb: plan.verb,
        url: url.to_string(),
        headers,
        body,
        timeout_ms: config.request_timeout_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamMap;
    use graft_net::Verb;

    fn plan(verb: Verb, url: &str) -> RequestPlan {
        RequestPlan {
            element: NodeId::ROOT,
            verb,
            url: url.to_string(),
            target: NodeId::ROOT,
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
    fn test_relative_url_resolution() {
        let url = resolve_url("https://example.test/app/page", "/search").unwrap();
        assert_eq!(url.as_str(), "https://example.test/search");
        let url = resolve_url("https://example.test/app/", "sub").unwrap();
        assert_eq!(url.as_str(), "https://example.test/app/sub");
    }

    #[test]
    fn test_get_params_go_to_query() {
        let tree = DomTree::new();
        let config = EngineConfig::default();
        let mut p = plan(Verb::Get, "/search");
        p.params.append_text("q", "rust");

        let wire =
            build_wire_request(&tree, &config, "https://example.test/", &p).unwrap();
        assert_eq!(wire.url, "https://example.test/search?q=rust");
        assert!(wire.body.is_none());
    }

    #[test]
    fn test_post_params_go_to_body() {
        let tree = DomTree::new();
        let config = EngineConfig::default();
        let mut p = plan(Verb::Post, "/items");
        p.params.append_text("name", "x");

        let wire =
            build_wire_request(&tree, &config, "https://example.test/", &p).unwrap();
        let body = wire.body.unwrap();
        assert_eq!(body.content_type, "application/x-www-form-urlencoded");
        assert_eq!(body.bytes, b"name=x");
        assert!(!wire.url.contains('?'));
    }

    #[test]
    fn test_protocol_headers() {
        let mut tree = DomTree::new();
        let button = tree.create_element("button");
        tree.set_attr(button, "id", "save");
        tree.append_child(NodeId::ROOT, button).unwrap();

        let config = EngineConfig::default();
        let mut p = plan(Verb::Post, "/save");
        p.element = button;
        p.target = button;

        let wire =
            build_wire_request(&tree, &config, "https://example.test/edit", &p).unwrap();
        assert_eq!(wire.headers.get("GX-Request"), Some("true"));
        assert_eq!(wire.headers.get("GX-Trigger"), Some("save"));
        assert_eq!(wire.headers.get("GX-Target"), Some("save"));
        assert_eq!(
            wire.headers.get("GX-Current-URL"),
            Some("https://example.test/edit")
        );
        assert!(wire.headers.get("GX-History-Restore-Request").is_none());
    }
}
