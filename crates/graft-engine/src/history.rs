//! History snapshot cache
//!
//! Before the document changes under a navigation, the engine records
//! a snapshot of the history element's markup keyed by normalized URL.
//! Restores replay the snapshot without a network round trip; a miss
//! falls back to a restore request. The cache is bounded and evicts
//! oldest-first.

use serde::{Deserialize, Serialize};
use url::Url;

/// One recorded page state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub url: String,
    /// Serialized markup of the history element's content
    pub content: String,
    pub title: Option<String>,
    /// Vertical scroll position at recording time
    pub scroll: f64,
}

/// Cache key: path plus query, origin stripped, trailing slash
/// trimmed except for the root path
pub fn normalize_url(raw: &str) -> String {
    let path_and_query = match Url::parse(raw) {
        Ok(url) => {
            let mut s = url.path().to_string();
            if let Some(q) = url.query() {
                s.push('?');
                s.push_str(q);
            }
            s
        }
        Err(_) => raw.to_string(),
    };
    let trimmed = path_and_query.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Where serialized snapshots go between sessions. Saving may fail
/// (bounded storage); the store reacts by shrinking.
pub trait HistoryStorage {
    fn load(&mut self) -> Option<String>;
    fn save(&mut self, data: &str) -> Result<(), String>;
}

/// In-memory storage with a byte quota
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Option<String>,
    /// Saves above this size fail, None means unbounded
    pub quota_bytes: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: None,
            quota_bytes: Some(quota_bytes),
        }
    }
}

impl HistoryStorage for MemoryStorage {
    fn load(&mut self) -> Option<String> {
        self.data.clone()
    }

    fn save(&mut self, data: &str) -> Result<(), String> {
        if let Some(quota) = self.quota_bytes {
            if data.len() > quota {
                return Err(format!("quota exceeded: {} > {quota}", data.len()));
            }
        }
        self.data = Some(data.to_string());
        Ok(())
    }
}

/// Bounded snapshot cache, oldest first
#[derive(Debug)]
pub struct HistoryStore {
    entries: Vec<HistorySnapshot>,
    cap: usize,
}

impl HistoryStore {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a snapshot. An existing entry for the same URL is
    /// replaced in place at the newest position.
    pub fn record(&mut self, mut snapshot: HistorySnapshot) {
        snapshot.url = normalize_url(&snapshot.url);
        self.entries.retain(|e| e.url != snapshot.url);
        self.entries.push(snapshot);
        while self.entries.len() > self.cap {
            let evicted = self.entries.remove(0);
            tracing::debug!(target: "graft", url = %evicted.url, "history snapshot evicted");
        }
    }

    pub fn lookup(&self, url: &str) -> Option<&HistorySnapshot> {
        let key = normalize_url(url);
        self.entries.iter().find(|e| e.url == key)
    }

    /// Serialize to storage. A failed save evicts the oldest snapshot
    /// and retries until the save fits or nothing is left.
    pub fn persist(&mut self, storage: &mut dyn HistoryStorage) {
        loop {
            let serialized = match serde_json::to_string(&self.entries) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(target: "graft", error = %e, "history serialization failed");
                    return;
                }
            };
            match storage.save(&serialized) {
                Ok(()) => return,
                Err(detail) => {
                    if self.entries.is_empty() {
                        tracing::warn!(target: "graft", %detail, "history persistence abandoned");
                        return;
                    }
                    let evicted = self.entries.remove(0);
                    tracing::debug!(
                        target: "graft",
                        url = %evicted.url,
                        %detail,
                        "history snapshot evicted to fit storage"
                    );
                }
            }
        }
    }

    /// Reload from storage, dropping unreadable data
    pub fn restore_from(&mut self, storage: &mut dyn HistoryStorage) {
        if let Some(data) = storage.load() {
            match serde_json::from_str::<Vec<HistorySnapshot>>(&data) {
                Ok(entries) => {
                    self.entries = entries;
                    while self.entries.len() > self.cap {
                        self.entries.remove(0);
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "graft", error = %e, "stored history unreadable, discarded")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(url: &str) -> HistorySnapshot {
        HistorySnapshot {
            url: url.to_string(),
            content: format!("<p>{url}</p>"),
            title: None,
            scroll: 0.0,
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_url("https://example.test/a/b/"), "/a/b");
        assert_eq!(normalize_url("https://example.test/a?x=1"), "/a?x=1");
        assert_eq!(normalize_url("https://example.test/"), "/");
        assert_eq!(normalize_url("/plain/path/"), "/plain/path");
    }

    #[test]
    fn test_bound_evicts_oldest() {
        let mut store = HistoryStore::new(3);
        for i in 0..4 {
            store.record(snap(&format!("/page{i}")));
        }
        assert_eq!(store.len(), 3);
        assert!(store.lookup("/page0").is_none());
        assert!(store.lookup("/page3").is_some());
    }

    #[test]
    fn test_same_url_replaces() {
        let mut store = HistoryStore::new(3);
        store.record(snap("/a"));
        let mut updated = snap("/a");
        updated.content = "<p>fresh</p>".to_string();
        store.record(updated);
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup("/a").unwrap().content, "<p>fresh</p>");
    }

    #[test]
    fn test_persist_shrinks_to_fit() {
        let mut store = HistoryStore::new(10);
        for i in 0..5 {
            store.record(snap(&format!("/page{i}")));
        }
        let mut storage = MemoryStorage::with_quota(200);
        store.persist(&mut storage);
        // oldest entries were sacrificed, newest survive
        assert!(store.len() < 5);
        assert!(store.lookup("/page4").is_some());

        let mut reloaded = HistoryStore::new(10);
        reloaded.restore_from(&mut storage);
        assert_eq!(reloaded.len(), store.len());
    }
}
