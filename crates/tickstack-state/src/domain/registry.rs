//! Factory registry used to resolve transition requests by name and to
//! rebuild states from snapshots.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tickstack_core::error::CoreError;
use tickstack_core::event::TransitionRequest;
use tickstack_core::state::StateFactory;

/// Maps factory names to factories.
#[derive(Default, Clone)]
pub struct StateRegistry {
    factories: HashMap<String, Arc<dyn StateFactory>>,
}

impl StateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under its own name, returning any factory it
    /// replaced.
    pub fn register(&mut self, factory: Arc<dyn StateFactory>) -> Option<Arc<dyn StateFactory>> {
        self.factories.insert(factory.name().to_owned(), factory)
    }

    /// Looks up a factory by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn StateFactory>> {
        self.factories.get(name).cloned()
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds a transition request for the named factory.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownFactory` if no factory has that name.
    pub fn request(&self, name: &str, params: Value) -> Result<TransitionRequest, CoreError> {
        self.get(name)
            .map(|factory| TransitionRequest::new(factory, params))
            .ok_or_else(|| CoreError::UnknownFactory(name.to_owned()))
    }
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("factories", &self.names())
            .finish()
    }
}
