//! Request parameter multi-map
//!
//! An explicit ordered multi-map (key → list of values) with defined
//! first/all/replace-all accessors. Entry order is preserved so the
//! encoded request body is deterministic.

use graft_dom::forms::EntryValue;
use graft_dom::FileAttachment;
use graft_net::FormPayload;

/// One parameter value
#[derive(Debug, Clone)]
pub enum ParamValue {
    Text(String),
    File(FileAttachment),
}

impl From<EntryValue> for ParamValue {
    fn from(entry: EntryValue) -> Self {
        match entry {
            EntryValue::Text(t) => ParamValue::Text(t),
            EntryValue::File(f) => ParamValue::File(f),
        }
    }
}

impl ParamValue {
    /// Text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(t) => Some(t),
            ParamValue::File(_) => None,
        }
    }
}

/// Ordered parameter multi-map
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    entries: Vec<(String, ParamValue)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping existing values for the key
    pub fn append(&mut self, key: &str, value: ParamValue) {
        self.entries.push((key.to_string(), value));
    }

    /// Append a text value
    pub fn append_text(&mut self, key: &str, value: &str) {
        self.append(key, ParamValue::Text(value.to_string()));
    }

    /// First value for a key
    pub fn first(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First text value for a key
    pub fn first_text(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .find_map(|(_, v)| v.as_text())
    }

    /// All values for a key, in insertion order
    pub fn all(&self, key: &str) -> Vec<&ParamValue> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    /// Replace every value for a key with one value. The replacement
    /// takes the position of the key's first existing entry.
    pub fn replace_all(&mut self, key: &str, value: ParamValue) {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.entries[index].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(k, _)| {
                    if k == key {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Check for a key's presence
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Remove every value for a key
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    /// Keep only entries whose key passes the filter
    pub fn retain_keys(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|(k, _)| keep(k));
    }

    /// Iterate entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Convert into the wire-level form payload
    pub fn to_form_payload(&self) -> FormPayload {
        let mut payload = FormPayload::new();
        for (key, value) in &self.entries {
            match value {
                ParamValue::Text(t) => payload.append(key, t),
                ParamValue::File(f) => {
                    payload.append_file(key, &f.filename, &f.content_type, f.bytes.clone())
                }
            }
        }
        payload
    }
}
