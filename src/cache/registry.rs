#[cfg(test)]
use dashmap::mapref::entry::Entry;
use dashmap::mapref::entry::VacantEntry;
use dashmap::DashMap;
use dashmap::DashSet;

use super::WatchHandle;
use crate::metrics::ACTIVE_WATCHES;
use crate::metrics::QUARANTINED_RESOURCES;
use crate::ResourceType;

/// Shared state of one cache.
///
/// Readers and the creation path use it concurrently. Only the coordinator
/// removes from `active` or inserts into `quarantined`.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) active: DashMap<ResourceType, WatchHandle>,
    pub(crate) quarantined: DashSet<ResourceType>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_quarantined(
        &self,
        resource: &ResourceType,
    ) -> bool {
        self.quarantined.contains(resource)
    }

    /// Insert a new handle into a vacant slot. The gauge is raised before the
    /// handle becomes visible to the coordinator.
    pub(crate) fn admit(
        entry: VacantEntry<'_, ResourceType, WatchHandle>,
        handle: WatchHandle,
    ) {
        ACTIVE_WATCHES.inc();
        entry.insert(handle);
    }

    /// Insert `handle` unless its type is already registered.
    #[cfg(test)]
    pub(crate) fn insert(
        &self,
        handle: WatchHandle,
    ) {
        if let Entry::Vacant(entry) = self.active.entry(handle.resource.clone()) {
            Self::admit(entry, handle);
        }
    }

    /// Returns true if `resource` was not quarantined before.
    pub(crate) fn quarantine(
        &self,
        resource: &ResourceType,
    ) -> bool {
        let inserted = self.quarantined.insert(resource.clone());
        if inserted {
            QUARANTINED_RESOURCES.inc();
        }
        inserted
    }

    pub(crate) fn remove(
        &self,
        resource: &ResourceType,
    ) -> Option<WatchHandle> {
        let removed = self.active.remove(resource).map(|(_, handle)| handle);
        if removed.is_some() {
            ACTIVE_WATCHES.dec();
        }
        removed
    }

    /// Remove and return every active handle.
    pub(crate) fn drain(&self) -> Vec<WatchHandle> {
        let keys: Vec<ResourceType> = self.active.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter_map(|k| self.remove(k)).collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<WatchHandle> {
        let mut handles: Vec<WatchHandle> = self.active.iter().map(|e| e.value().clone()).collect();
        handles.sort_by(|a, b| a.resource.cmp(&b.resource));
        handles
    }
}
