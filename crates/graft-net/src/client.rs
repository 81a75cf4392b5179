//! HTTP client
//!
//! Performs the actual network call for a resolved `WireRequest`. The
//! exchange engine itself never blocks on this; a host drives the client
//! and hands the completed `WireResponse` back to the engine.

use crate::{HeaderMap, NetError, Verb, WireRequest, WireResponse};

/// reqwest-backed HTTP client
#[derive(Debug, Default)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// Create a new client
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Send a request and collect the full response
    pub async fn send(&self, request: &WireRequest) -> Result<WireResponse, NetError> {
        tracing::debug!(verb = request.verb.as_str(), url = %request.url, "sending request");

        let mut builder = match request.verb {
            Verb::Get => self.inner.get(&request.url),
            Verb::Post => self.inner.post(&request.url),
            Verb::Put => self.inner.put(&request.url),
            Verb::Patch => self.inner.patch(&request.url),
            Verb::Delete => self.inner.delete(&request.url),
        };

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header("Content-Type", body.content_type.as_str())
                .body(body.bytes.clone());
        }
        if let Some(timeout) = request.timeout_ms {
            builder = builder.timeout(std::time::Duration::from_millis(timeout));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout
            } else {
                NetError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.append(name.as_str(), v);
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout
            } else {
                NetError::Network(e.to_string())
            }
        })?;

        tracing::debug!(status, bytes = body.len(), "received response");
        Ok(WireResponse { status, headers, body })
    }

    /// Blocking convenience wrapper for synchronous hosts
    pub fn send_blocking(&self, request: &WireRequest) -> Result<WireResponse, NetError> {
        smol::block_on(self.send(request))
    }
}
