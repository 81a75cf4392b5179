//! Response routing
//!
//! Two concerns live here: classifying a status code against the
//! configurable rule table (swap or not, error or not), and decoding
//! the `GX-*` response headers into an explicit directive set.

use graft_net::{HeaderMap, WireResponse};

/// Status pattern in a response rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPattern {
    /// One exact code, e.g. `204`
    Exact(u16),
    /// A whole class, e.g. `2xx`
    Class(u8),
    /// Every code
    Any,
}

impl StatusPattern {
    /// Parse `204`, `2xx`, or `*`
    pub fn parse(raw: &str) -> Option<StatusPattern> {
        let raw = raw.trim();
        if raw == "*" {
            return Some(StatusPattern::Any);
        }
        if let Some(class) = raw.strip_suffix("xx") {
            let digit: u8 = class.parse().ok()?;
            if (1..=5).contains(&digit) {
                return Some(StatusPattern::Class(digit));
            }
            return None;
        }
        raw.parse().ok().map(StatusPattern::Exact)
    }

    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusPattern::Exact(code) => *code == status,
            StatusPattern::Class(digit) => status / 100 == u16::from(*digit),
            StatusPattern::Any => true,
        }
    }
}

/// One entry in the status rule table
#[derive(Debug, Clone)]
pub struct ResponseRule {
    pub pattern: StatusPattern,
    /// Whether the body is swapped into the document
    pub swap: bool,
    /// Whether the status is reported as a logical error
    pub error: bool,
    /// Optional named event to emit on the initiating element
    pub event: Option<String>,
}

impl ResponseRule {
    pub fn new(pattern: StatusPattern, swap: bool, error: bool) -> Self {
        Self { pattern, swap, error, event: None }
    }
}

/// How the engine should treat a response status
#[derive(Debug, Clone)]
pub struct Disposition {
    pub swap: bool,
    pub error: bool,
    pub event: Option<String>,
}

/// The built-in rule table. First match wins; an exact entry placed
/// before its class entry overrides it.
pub fn default_rules() -> Vec<ResponseRule> {
    vec![
        // No content: success, nothing to swap
        ResponseRule::new(StatusPattern::Exact(204), false, false),
        // Poll cancellation: swap the final body, polling stops elsewhere
        ResponseRule::new(StatusPattern::Exact(286), true, false),
        ResponseRule::new(StatusPattern::Class(2), true, false),
        ResponseRule::new(StatusPattern::Class(3), true, false),
        ResponseRule::new(StatusPattern::Class(4), false, true),
        ResponseRule::new(StatusPattern::Class(5), false, true),
    ]
}

/// Classify a status against the rule table, first match wins.
/// An unmatched status swaps nothing and reports nothing.
pub fn classify(rules: &[ResponseRule], status: u16) -> Disposition {
    for rule in rules {
        if rule.pattern.matches(status) {
            return Disposition {
                swap: rule.swap,
                error: rule.error,
                event: rule.event.clone(),
            };
        }
    }
    Disposition { swap: false, error: false, event: None }
}

/// Decoded `GX-*` response headers
#[derive(Debug, Clone, Default)]
pub struct ResponseDirectives {
    /// Full navigation to a new URL; processing stops after this
    pub redirect: Option<String>,
    /// Full reload of the current URL
    pub refresh: bool,
    /// Override of the planned target selector
    pub retarget: Option<String>,
    /// Override of the fragment selection
    pub reselect: Option<String>,
    /// Fragment elements matching this selector are treated as
    /// out-of-band content
    pub reselect_oob: Option<String>,
    /// Override of the planned swap specification
    pub reswap: Option<String>,
    /// History push requested by the server (`false` suppresses)
    pub push_url: Option<String>,
    /// History replace requested by the server
    pub replace_url: Option<String>,
    /// Events to emit as soon as headers are seen
    pub trigger_now: Vec<String>,
    /// Events to emit after the swap
    pub trigger_after_swap: Vec<String>,
    /// Events to emit after settle
    pub trigger_after_settle: Vec<String>,
}

fn split_events(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl ResponseDirectives {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut d = ResponseDirectives::default();
        // GX-Location is the out-of-band variant of GX-Redirect; the
        // headless engine treats both as a navigation request.
        d.redirect = headers
            .get("GX-Redirect")
            .or_else(|| headers.get("GX-Location"))
            .map(str::to_string);
        d.refresh = headers
            .get("GX-Refresh")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        d.retarget = headers.get("GX-Retarget").map(str::to_string);
        d.reselect = headers.get("GX-Reselect").map(str::to_string);
        d.reselect_oob = headers.get("GX-Reselect-Oob").map(str::to_string);
        d.reswap = headers.get("GX-Reswap").map(str::to_string);
        d.push_url = headers.get("GX-Push-Url").map(str::to_string);
        d.replace_url = headers.get("GX-Replace-Url").map(str::to_string);
        if let Some(raw) = headers.get("GX-Trigger") {
            d.trigger_now = split_events(raw);
        }
        if let Some(raw) = headers.get("GX-Trigger-After-Swap") {
            d.trigger_after_swap = split_events(raw);
        }
        if let Some(raw) = headers.get("GX-Trigger-After-Settle") {
            d.trigger_after_settle = split_events(raw);
        }
        d
    }

    pub fn from_response(response: &WireResponse) -> Self {
        Self::from_headers(&response.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_parse() {
        assert_eq!(StatusPattern::parse("204"), Some(StatusPattern::Exact(204)));
        assert_eq!(StatusPattern::parse("2xx"), Some(StatusPattern::Class(2)));
        assert_eq!(StatusPattern::parse("*"), Some(StatusPattern::Any));
        assert_eq!(StatusPattern::parse("9xx"), None);
        assert_eq!(StatusPattern::parse("abc"), None);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = default_rules();
        let no_content = classify(&rules, 204);
        assert!(!no_content.swap && !no_content.error);

        let ok = classify(&rules, 200);
        assert!(ok.swap && !ok.error);

        let not_found = classify(&rules, 404);
        assert!(!not_found.swap && not_found.error);

        let poll_stop = classify(&rules, 286);
        assert!(poll_stop.swap && !poll_stop.error);
    }

    #[test]
    fn test_unmatched_is_inert() {
        let d = classify(&[], 200);
        assert!(!d.swap && !d.error);
    }

    #[test]
    fn test_directive_decoding() {
        let mut headers = HeaderMap::new();
        headers.set("GX-Retarget", "#other");
        headers.set("GX-Trigger", "a, b");
        headers.set("GX-Refresh", "true");
        let d = ResponseDirectives::from_headers(&headers);
        assert_eq!(d.retarget.as_deref(), Some("#other"));
        assert_eq!(d.trigger_now, vec!["a", "b"]);
        assert!(d.refresh);
        assert!(d.redirect.is_none());
    }
}
