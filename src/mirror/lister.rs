use std::sync::Arc;

use super::MirrorStore;
use crate::object_key;
use crate::DynamicObject;
use crate::ResourceType;
use crate::Selector;

/// Read accessor over a mirror. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Lister {
    store: MirrorStore,
}

impl Lister {
    pub(crate) fn new(store: MirrorStore) -> Self {
        Self { store }
    }

    pub fn resource(&self) -> &ResourceType {
        self.store.resource()
    }

    /// Look up by store key (`namespace/name`, or `name` when cluster scoped).
    pub fn get(
        &self,
        key: &str,
    ) -> Option<Arc<DynamicObject>> {
        self.store.get(key)
    }

    /// Objects whose labels match `selector`, ordered by key.
    pub fn list(
        &self,
        selector: &Selector,
    ) -> Vec<Arc<DynamicObject>> {
        self.store
            .snapshot()
            .into_iter()
            .map(|(_, obj)| obj)
            .filter(|obj| selector.matches(obj.labels()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn namespaced(
        &self,
        namespace: impl Into<String>,
    ) -> NamespaceLister {
        NamespaceLister {
            store: self.store.clone(),
            namespace: namespace.into(),
        }
    }
}

/// Read accessor limited to one namespace.
#[derive(Debug, Clone)]
pub struct NamespaceLister {
    store: MirrorStore,
    namespace: String,
}

impl NamespaceLister {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<Arc<DynamicObject>> {
        self.store.get(&object_key(&self.namespace, name))
    }

    pub fn list(
        &self,
        selector: &Selector,
    ) -> Vec<Arc<DynamicObject>> {
        self.store
            .snapshot()
            .into_iter()
            .map(|(_, obj)| obj)
            .filter(|obj| obj.namespace() == self.namespace && selector.matches(obj.labels()))
            .collect()
    }
}
