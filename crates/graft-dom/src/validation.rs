//! Form validation
//!
//! Constraint validation over form controls, run by the engine before a
//! non-GET exchange leaves the document.

use crate::{forms, DomTree, NodeId};

/// Validity state for form controls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityState {
    /// The element's value is missing (for required)
    pub value_missing: bool,
    /// The element's value is too long
    pub too_long: bool,
    /// The element's value is too short
    pub too_short: bool,
    /// The element's value is below the minimum
    pub range_underflow: bool,
    /// The element's value is above the maximum
    pub range_overflow: bool,
}

impl ValidityState {
    /// Check if the control is valid
    pub fn is_valid(&self) -> bool {
        !self.value_missing
            && !self.too_long
            && !self.too_short
            && !self.range_underflow
            && !self.range_overflow
    }
}

/// Validation constraints read from a control's attributes
#[derive(Debug, Clone, Default)]
pub struct ValidationConstraints {
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
}

impl ValidationConstraints {
    /// Read constraints from a control element
    pub fn from_element(tree: &DomTree, id: NodeId) -> Self {
        let attr_num = |name: &str| tree.attr(id, name).and_then(|v| v.parse::<f64>().ok());
        let attr_len = |name: &str| tree.attr(id, name).and_then(|v| v.parse::<u32>().ok());
        Self {
            required: tree
                .element(id)
                .map(|e| e.has_attr("required"))
                .unwrap_or(false),
            min: attr_num("min"),
            max: attr_num("max"),
            min_length: attr_len("minlength"),
            max_length: attr_len("maxlength"),
        }
    }

    /// Validate a string value
    pub fn validate_string(&self, value: &str) -> ValidityState {
        let mut state = ValidityState::default();

        if self.required && value.is_empty() {
            state.value_missing = true;
        }
        if let Some(max) = self.max_length {
            if value.chars().count() > max as usize {
                state.too_long = true;
            }
        }
        if let Some(min) = self.min_length {
            if !value.is_empty() && value.chars().count() < (min as usize) {
                state.too_short = true;
            }
        }
        if let Ok(number) = value.parse::<f64>() {
            if let Some(min) = self.min {
                if number < min {
                    state.range_underflow = true;
                }
            }
            if let Some(max) = self.max {
                if number > max {
                    state.range_overflow = true;
                }
            }
        }
        state
    }
}

/// Validate one control against its declared constraints
pub fn validate_control(tree: &DomTree, id: NodeId) -> ValidityState {
    let constraints = ValidationConstraints::from_element(tree, id);
    let value = forms::current_value(tree, id).unwrap_or_default();
    let state = constraints.validate_string(&value);
    if !state.is_valid() {
        tracing::debug!(target: "graft", control = id.0, ?state, "constraint validation failed");
    }
    state
}
