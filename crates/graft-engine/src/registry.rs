//! Extension registries
//!
//! Custom swap styles and trigger guards are plain host-registered
//! entries looked up by name. Nothing here is discovered implicitly;
//! an unknown name is an error surfaced to the caller.

use std::collections::HashMap;

use graft_dom::{DomTree, NodeId};
use thiserror::Error;

/// A host-defined swap strategy, selected by name from a swap attribute
pub trait SwapExtension {
    fn name(&self) -> &str;

    /// Apply the fragment to the target. Return false to report the
    /// swap as failed.
    fn swap(&self, tree: &mut DomTree, target: NodeId, content: &DomTree) -> bool;
}

/// Named swap strategies, resolved when a swap attribute names one
#[derive(Default)]
pub struct SwapExtensionRegistry {
    extensions: Vec<Box<dyn SwapExtension>>,
}

impl SwapExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: Box<dyn SwapExtension>) {
        tracing::debug!(target: "graft", name = extension.name(), "swap extension registered");
        self.extensions.push(extension);
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn SwapExtension> {
        self.extensions
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }
}

/// Guard predicate evaluated before a trigger fires. The error string
/// is reported to the host; the trigger then proceeds as if the guard
/// had passed.
pub type GuardFn = dyn Fn(&DomTree, NodeId) -> Result<bool, String>;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("unknown guard `{0}`")]
    Unknown(String),
    #[error("guard `{name}` failed: {detail}")]
    Failed { name: String, detail: String },
}

/// Named trigger guards
#[derive(Default)]
pub struct GuardRegistry {
    guards: HashMap<String, Box<GuardFn>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        guard: impl Fn(&DomTree, NodeId) -> Result<bool, String> + 'static,
    ) {
        self.guards.insert(name.to_string(), Box::new(guard));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.guards.contains_key(name)
    }

    /// Run a guard by name
    pub fn evaluate(
        &self,
        name: &str,
        tree: &DomTree,
        element: NodeId,
    ) -> Result<bool, GuardError> {
        let guard = self
            .guards
            .get(name)
            .ok_or_else(|| GuardError::Unknown(name.to_string()))?;
        guard(tree, element).map_err(|detail| GuardError::Failed {
            name: name.to_string(),
            detail,
        })
    }
}
