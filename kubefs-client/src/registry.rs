use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::folder::{self, Deps, Folder};

/// Builds the child folder of one object row: `(deps, namespace, name, base_path)`.
pub type ChildCtor =
    Arc<dyn Fn(Arc<Deps>, Option<String>, String, String) -> Arc<dyn Folder> + Send + Sync>;

/// Kind name → constructor of the synthetic listing shown when a row of that
/// kind is entered. Written at start-up, read on every populate.
#[derive(Default)]
pub struct ChildRegistry {
    ctors: RwLock<HashMap<String, ChildCtor>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pods open their containers, config maps and secrets their keys, and
    /// namespaces the kinds scoped to them.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("Pod", folder::containers);
        registry.register("ConfigMap", folder::config_map_keys);
        registry.register("Secret", folder::secret_keys);
        registry.register("Namespace", |deps, _ns, name, base| {
            folder::namespace_kinds(deps, name, base)
        });
        registry
    }

    /// Last registration for a kind wins.
    pub fn register<F>(&self, kind: &str, ctor: F)
    where
        F: Fn(Arc<Deps>, Option<String>, String, String) -> Arc<dyn Folder> + Send + Sync + 'static,
    {
        let mut ctors = self.ctors.write().unwrap_or_else(PoisonError::into_inner);
        if ctors.insert(kind.to_lowercase(), Arc::new(ctor)).is_some() {
            tracing::debug!(kind, "replaced child listing");
        }
    }

    pub fn get(&self, kind: &str) -> Option<ChildCtor> {
        self.ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind.to_lowercase())
            .cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&kind.to_lowercase())
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .ctors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for ChildRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
