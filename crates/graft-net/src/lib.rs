//! Graft networking
//!
//! The wire-level request/response model shared by the exchange engine
//! and its hosts, plus a reqwest-backed client hosts can use to perform
//! the actual calls.

mod body;
mod client;
mod headers;

pub use body::{FormPayload, FormValue, RequestBody};
pub use client::HttpClient;
pub use headers::HeaderMap;

/// HTTP verbs the exchange engine issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    /// Wire name of the verb
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Parse a verb name (case-insensitive)
    pub fn parse(s: &str) -> Option<Verb> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "PATCH" => Some(Verb::Patch),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }

    /// GET requests carry parameters in the query string, not the body
    pub fn is_get(&self) -> bool {
        matches!(self, Verb::Get)
    }
}

/// One outgoing request, fully resolved by the engine
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub verb: Verb,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub timeout_ms: Option<u64>,
}

/// One response as delivered back to the engine
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl WireResponse {
    /// Convenience constructor for hosts and tests
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.to_string(),
        }
    }

    /// Deserialize the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_str(&self.body).map_err(|e| NetError::Parse(e.to_string()))
    }
}

/// Network errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout")]
    Timeout,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_parse() {
        assert_eq!(Verb::parse("get"), Some(Verb::Get));
        assert_eq!(Verb::parse("DELETE"), Some(Verb::Delete));
        assert_eq!(Verb::parse("OPTIONS"), None);
        assert_eq!(Verb::Patch.as_str(), "PATCH");
    }
}
