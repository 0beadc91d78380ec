//! Action registry for name-based action lookup.
//!
//! Registration is serialized per name through the `DashMap` entry API, so two
//! concurrent registrations of the same name can never both succeed. Lookups
//! are lock-free reads and may run concurrently with each other.

use std::sync::Arc;

use batchflow_types::error::{EngineError, ErrorKind};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use super::Action;
use super::box_action::BoxAction;

/// Registry of executable actions, indexed by name.
///
/// Cloning is cheap and clones share the same underlying map.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<DashMap<String, Arc<BoxAction>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `action` with `config`, then register it under its name.
    ///
    /// Fails with `ActionExists` if the name is already taken; in that case
    /// `configure` is not called. A `configure` error aborts the registration.
    pub async fn register<A: Action + 'static>(
        &self,
        mut action: A,
        config: &Value,
    ) -> Result<(), EngineError> {
        let name = action.name().to_string();
        if self.actions.contains_key(&name) {
            return Err(action_exists(&name));
        }

        action.configure(config).await?;

        // A concurrent registration may have claimed the name while we awaited.
        match self.actions.entry(name) {
            Entry::Occupied(entry) => Err(action_exists(entry.key())),
            Entry::Vacant(entry) => {
                tracing::info!(action = %entry.key(), "registered action");
                entry.insert(Arc::new(BoxAction::new(action)));
                Ok(())
            }
        }
    }

    /// Look up an action by name.
    pub fn get(&self, name: &str) -> Result<Arc<BoxAction>, EngineError> {
        self.actions
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                EngineError::general(
                    ErrorKind::ActionNotFound,
                    format!("Action with name {name} not found"),
                )
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Remove an action, returning whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.actions.remove(name).is_some()
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn action_exists(name: &str) -> EngineError {
    EngineError::general(
        ErrorKind::ActionExists,
        format!("Action with name {name} already exists"),
    )
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
