//! Engine configuration

use crate::router::{default_rules, ResponseRule};
use crate::swap::SwapStyle;

/// Tunables applied where markup does not say otherwise
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Swap style when the element carries no swap attribute
    pub default_swap_style: SwapStyle,
    /// Delay before applying a swap, in milliseconds
    pub default_swap_delay_ms: u64,
    /// Settle window after a swap, in milliseconds
    pub default_settle_delay_ms: u64,
    /// Maximum retained history snapshots
    pub history_cache_size: usize,
    /// Master switch for history recording
    pub history_enabled: bool,
    /// Class toggled on indicator elements while a request is in flight
    pub indicator_class: String,
    /// Attributes copied from incoming to existing elements during settle
    pub attr_merge_allowlist: Vec<String>,
    /// Status that stops an active poll loop
    pub poll_cancel_status: u16,
    /// Run constraint validation before non-GET form submissions
    pub validate_forms: bool,
    /// Adopt the fragment's title element into the document
    pub refresh_title: bool,
    /// Per-request timeout handed to the transport, if any
    pub request_timeout_ms: Option<u64>,
    /// Interval between viewport scans for reveal/intersect triggers
    pub reveal_poll_interval_ms: u64,
    /// Status classification table, first match wins
    pub response_rules: Vec<ResponseRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_swap_style: SwapStyle::ReplaceInner,
            default_swap_delay_ms: 0,
            default_settle_delay_ms: 20,
            history_cache_size: 10,
            history_enabled: true,
            indicator_class: "gx-request".to_string(),
            attr_merge_allowlist: ["class", "style", "width", "height"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            poll_cancel_status: 286,
            validate_forms: true,
            refresh_title: true,
            request_timeout_ms: None,
            reveal_poll_interval_ms: 200,
            response_rules: default_rules(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_swap_style, SwapStyle::ReplaceInner);
        assert_eq!(config.default_settle_delay_ms, 20);
        assert_eq!(config.history_cache_size, 10);
        assert_eq!(config.poll_cancel_status, 286);
        assert!(config.attr_merge_allowlist.contains(&"class".to_string()));
    }
}
