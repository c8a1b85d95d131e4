use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::Notification;
use super::ResourceEventHandler;
use crate::DynamicObject;
use crate::Lister;
use crate::ResourceType;
use crate::WatchEvent;

struct StoreInner {
    resource: ResourceType,
    /// object key -> latest object
    items: RwLock<HashMap<String, Arc<DynamicObject>>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler>>>,
}

/// Indexed local store for one resource type.
#[derive(Clone)]
pub struct MirrorStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for MirrorStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("MirrorStore")
            .field("resource", &self.inner.resource)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl MirrorStore {
    pub fn new(resource: ResourceType) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                resource,
                items: RwLock::new(HashMap::new()),
                handlers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn resource(&self) -> &ResourceType {
        &self.inner.resource
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lister(&self) -> Lister {
        Lister::new(self.clone())
    }

    pub(crate) fn get(
        &self,
        key: &str,
    ) -> Option<Arc<DynamicObject>> {
        self.inner.items.read().get(key).cloned()
    }

    /// Snapshot of every object, sorted by key.
    pub(crate) fn snapshot(&self) -> Vec<(String, Arc<DynamicObject>)> {
        let mut all: Vec<_> = self
            .inner
            .items
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Register a handler. Objects already in the store are replayed to it as adds.
    pub fn add_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler>,
    ) {
        // Replayed under the handler lock so no later event overtakes the replay.
        let mut handlers = self.inner.handlers.write();
        for (_, obj) in self.snapshot() {
            handler.on_add(&obj);
        }
        handlers.push(handler);
    }

    /// Replace the whole content with the result of a (re)list.
    ///
    /// Objects missing from `objects` are reported as deleted, changed ones as
    /// updated, new ones as added.
    pub fn replace(
        &self,
        objects: Vec<DynamicObject>,
    ) {
        let mut notifications = Vec::new();
        {
            let mut items = self.inner.items.write();
            let mut fresh: HashMap<String, Arc<DynamicObject>> = HashMap::with_capacity(objects.len());

            for obj in objects {
                let key = obj.key();
                let new = Arc::new(obj);
                match items.remove(&key) {
                    Some(old) if *old == *new => {
                        fresh.insert(key, old);
                        continue;
                    }
                    Some(old) => notifications.push(Notification::Update(old, new.clone())),
                    None => notifications.push(Notification::Add(new.clone())),
                }
                fresh.insert(key, new);
            }

            for (_, gone) in items.drain() {
                notifications.push(Notification::Delete(gone));
            }
            *items = fresh;
        }

        trace!(
            resource = %self.inner.resource,
            changes = notifications.len(),
            "store replaced"
        );
        self.dispatch(notifications);
    }

    /// Apply one watch event.
    pub fn apply(
        &self,
        event: WatchEvent,
    ) {
        let notification = {
            let mut items = self.inner.items.write();
            match event {
                WatchEvent::Added(obj) | WatchEvent::Modified(obj) => {
                    let new = Arc::new(obj);
                    match items.insert(new.key(), new.clone()) {
                        Some(old) => Some(Notification::Update(old, new)),
                        None => Some(Notification::Add(new)),
                    }
                }
                WatchEvent::Deleted(obj) => items.remove(&obj.key()).map(Notification::Delete),
                WatchEvent::Bookmark { .. } => None,
            }
        };

        if let Some(n) = notification {
            self.dispatch(vec![n]);
        }
    }

    /// Re-deliver every object to handlers as an update with itself.
    pub fn resync(&self) {
        let notifications = self
            .snapshot()
            .into_iter()
            .map(|(_, obj)| Notification::Update(obj.clone(), obj))
            .collect();
        self.dispatch(notifications);
    }

    fn dispatch(
        &self,
        notifications: Vec<Notification>,
    ) {
        if notifications.is_empty() {
            return;
        }
        let handlers = self.inner.handlers.read().clone();
        for handler in handlers.iter() {
            for n in &notifications {
                n.deliver(handler.as_ref());
            }
        }
    }
}
