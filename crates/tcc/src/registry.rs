//! Component registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tx_store::ComponentId;

use crate::component::Component;
use crate::error::{Error, Result};

/// In-memory mapping from component identifier to component handle.
///
/// Reads take a shared lock, so concurrent lookups do not block each other;
/// registration takes the exclusive lock. A lookup observes a consistent
/// snapshot of the mapping at the moment it runs.
#[derive(Default)]
pub struct Registry {
    components: RwLock<HashMap<ComponentId, Arc<dyn Component>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component under its own identifier.
    pub fn register(&self, component: Arc<dyn Component>) -> Result<()> {
        let id = component.id().clone();
        let mut components = self.components.write().unwrap();
        if components.contains_key(&id) {
            return Err(Error::DuplicateRegistration(id));
        }
        components.insert(id, component);
        Ok(())
    }

    /// Returns the handle registered under `id`.
    pub fn lookup(&self, id: &ComponentId) -> Result<Arc<dyn Component>> {
        self.components
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownComponent(id.clone()))
    }

    /// Returns handles for every ID, in the same order.
    ///
    /// Fails atomically on the first missing ID; no partial result.
    pub fn lookup_all<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ComponentId>,
    ) -> Result<Vec<Arc<dyn Component>>> {
        let components = self.components.read().unwrap();
        ids.into_iter()
            .map(|id| {
                components
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::UnknownComponent(id.clone()))
            })
            .collect()
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.read().unwrap().len()
    }

    /// True if no component is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
