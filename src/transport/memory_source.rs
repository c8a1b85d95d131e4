//! In-process [`ListWatch`] backed by plain maps.
//!
//! Every mutation bumps a single source-wide revision, which becomes the
//! object's `resourceVersion`. A bounded history of events lets watchers
//! resume from a recent version; resuming from a compacted one yields
//! [`SourceError::Expired`], just like a real API server.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use futures::future;
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use tracing::info;

use super::ListParams;
use super::ListWatch;
use super::WatchEvent;
use super::WatchStream;
use crate::constants::MEMORY_SOURCE_HISTORY;
use crate::constants::MEMORY_SOURCE_WATCH_BUFFER;
use crate::file_io::list_json_files;
use crate::object_key;
use crate::DynamicObject;
use crate::ObjectList;
use crate::ResourceType;
use crate::Result;
use crate::SourceError;

type Broadcast = broadcast::Sender<std::result::Result<WatchEvent, SourceError>>;

struct Collection {
    objects: BTreeMap<String, DynamicObject>,
    history: VecDeque<(u64, WatchEvent)>,
    /// Highest revision evicted from `history`.
    compacted: u64,
    sender: Broadcast,
    rejection: Option<SourceError>,
    /// Errors returned by upcoming list calls, one per call.
    pending_list_failures: VecDeque<SourceError>,
}

impl Collection {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(MEMORY_SOURCE_WATCH_BUFFER);
        Self {
            objects: BTreeMap::new(),
            history: VecDeque::new(),
            compacted: 0,
            sender,
            rejection: None,
            pending_list_failures: VecDeque::new(),
        }
    }

    fn record(
        &mut self,
        revision: u64,
        event: WatchEvent,
        history_limit: usize,
    ) {
        self.history.push_back((revision, event.clone()));
        while self.history.len() > history_limit {
            if let Some((rv, _)) = self.history.pop_front() {
                self.compacted = rv;
            }
        }
        // No receivers is fine.
        let _ = self.sender.send(Ok(event));
    }
}

#[derive(Default)]
struct SourceState {
    revision: u64,
    collections: HashMap<ResourceType, Collection>,
    list_calls: HashMap<ResourceType, usize>,
    watch_calls: HashMap<ResourceType, usize>,
}

/// Fixture file layout accepted by [`MemorySource::from_fixture_dir`].
#[derive(Debug, Deserialize)]
struct Fixture {
    resource: ResourceType,
    #[serde(default)]
    items: Vec<DynamicObject>,
}

pub struct MemorySource {
    state: Mutex<SourceState>,
    /// Unknown resource types are `NotFound` instead of empty.
    strict: bool,
    history_limit: usize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    /// Source that serves any resource type, starting empty.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SourceState::default()),
            strict: false,
            history_limit: MEMORY_SOURCE_HISTORY,
        }
    }

    /// Source that only serves resource types registered via [`Self::register`]
    /// or [`Self::seed`].
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    pub fn with_history_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Load every `*.json` fixture in `dir` into a strict source.
    pub fn from_fixture_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let source = Self::strict();
        for path in list_json_files(dir.as_ref())? {
            let raw = std::fs::read_to_string(&path)?;
            let fixture: Fixture = serde_json::from_str(&raw)?;
            debug!(
                path = %path.display(),
                resource = %fixture.resource,
                items = fixture.items.len(),
                "loaded fixture"
            );
            source.seed(&fixture.resource, fixture.items);
        }

        info!(
            resources = source.state.lock().collections.len(),
            "memory source ready"
        );
        Ok(source)
    }

    /// Make `resource` known without adding objects.
    pub fn register(
        &self,
        resource: &ResourceType,
    ) {
        self.state
            .lock()
            .collections
            .entry(resource.clone())
            .or_insert_with(Collection::new);
    }

    pub fn seed(
        &self,
        resource: &ResourceType,
        items: Vec<DynamicObject>,
    ) {
        self.register(resource);
        for obj in items {
            self.apply(resource, obj);
        }
    }

    /// Create or replace an object, notifying watchers.
    pub fn apply(
        &self,
        resource: &ResourceType,
        mut obj: DynamicObject,
    ) -> String {
        let mut state = self.state.lock();
        state.revision += 1;
        let revision = state.revision;
        obj.metadata.resource_version = revision.to_string();

        let collection = state
            .collections
            .entry(resource.clone())
            .or_insert_with(Collection::new);
        let event = match collection.objects.insert(obj.key(), obj.clone()) {
            Some(_) => WatchEvent::Modified(obj),
            None => WatchEvent::Added(obj),
        };
        collection.record(revision, event, self.history_limit);
        revision.to_string()
    }

    pub fn delete(
        &self,
        resource: &ResourceType,
        namespace: &str,
        name: &str,
    ) -> Option<DynamicObject> {
        let mut state = self.state.lock();
        let SourceState {
            revision,
            collections,
            ..
        } = &mut *state;

        let collection = collections.get_mut(resource)?;
        let mut obj = collection.objects.remove(&object_key(namespace, name))?;
        *revision += 1;
        obj.metadata.resource_version = revision.to_string();
        collection.record(*revision, WatchEvent::Deleted(obj.clone()), self.history_limit);
        Some(obj)
    }

    /// Make every list and watch on `resource` fail with `error`, and break
    /// live watch streams with it.
    pub fn reject(
        &self,
        resource: &ResourceType,
        error: SourceError,
    ) {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .entry(resource.clone())
            .or_insert_with(Collection::new);
        collection.rejection = Some(error.clone());
        let _ = collection.sender.send(Err(error));
    }

    /// Fail the next `count` list calls on `resource` with `error`.
    pub fn fail_next_lists(
        &self,
        resource: &ResourceType,
        count: usize,
        error: SourceError,
    ) {
        let mut state = self.state.lock();
        let collection = state
            .collections
            .entry(resource.clone())
            .or_insert_with(Collection::new);
        collection.pending_list_failures.extend(std::iter::repeat(error).take(count));
    }

    /// Drop the event history so resuming a watch requires a relist.
    pub fn compact(
        &self,
        resource: &ResourceType,
    ) {
        let mut state = self.state.lock();
        let revision = state.revision;
        if let Some(collection) = state.collections.get_mut(resource) {
            collection.history.clear();
            collection.compacted = revision;
        }
    }

    /// End every live watch stream on `resource` cleanly.
    pub fn close_watches(
        &self,
        resource: &ResourceType,
    ) {
        let mut state = self.state.lock();
        if let Some(collection) = state.collections.get_mut(resource) {
            let (sender, _) = broadcast::channel(MEMORY_SOURCE_WATCH_BUFFER);
            collection.sender = sender;
        }
    }

    /// Break every live watch stream on `resource` with `Expired`, forcing a
    /// relist.
    pub fn expire_watches(
        &self,
        resource: &ResourceType,
    ) {
        let state = self.state.lock();
        if let Some(collection) = state.collections.get(resource) {
            let _ = collection
                .sender
                .send(Err(SourceError::Expired(format!("revision {} expired", state.revision))));
        }
    }

    pub fn list_calls(
        &self,
        resource: &ResourceType,
    ) -> usize {
        self.state.lock().list_calls.get(resource).copied().unwrap_or(0)
    }

    pub fn watch_calls(
        &self,
        resource: &ResourceType,
    ) -> usize {
        self.state.lock().watch_calls.get(resource).copied().unwrap_or(0)
    }

    /// Live watch streams on `resource`.
    pub fn watcher_count(
        &self,
        resource: &ResourceType,
    ) -> usize {
        self.state
            .lock()
            .collections
            .get(resource)
            .map(|c| c.sender.receiver_count())
            .unwrap_or(0)
    }

    fn not_found(resource: &ResourceType) -> SourceError {
        SourceError::NotFound(resource.to_string())
    }
}

fn in_namespace(
    event: &WatchEvent,
    namespace: &str,
) -> bool {
    if namespace.is_empty() {
        return true;
    }
    match event {
        WatchEvent::Added(obj) | WatchEvent::Modified(obj) | WatchEvent::Deleted(obj) => {
            obj.namespace() == namespace
        }
        WatchEvent::Bookmark { .. } => true,
    }
}

#[async_trait]
impl ListWatch for MemorySource {
    async fn list(
        &self,
        resource: &ResourceType,
        params: &ListParams,
    ) -> std::result::Result<ObjectList, SourceError> {
        let mut state = self.state.lock();
        *state.list_calls.entry(resource.clone()).or_insert(0) += 1;
        let revision = state.revision;
        let strict = self.strict;

        let collection = match state.collections.get_mut(resource) {
            Some(c) => c,
            None if strict => return Err(Self::not_found(resource)),
            None => {
                return Ok(ObjectList {
                    items: Vec::new(),
                    resource_version: revision.to_string(),
                })
            }
        };

        if let Some(e) = &collection.rejection {
            return Err(e.clone());
        }
        if let Some(e) = collection.pending_list_failures.pop_front() {
            return Err(e);
        }

        let items = collection
            .objects
            .values()
            .filter(|obj| params.namespace.is_empty() || obj.namespace() == params.namespace)
            .cloned()
            .collect();
        Ok(ObjectList {
            items,
            resource_version: revision.to_string(),
        })
    }

    async fn watch(
        &self,
        resource: &ResourceType,
        params: &ListParams,
    ) -> std::result::Result<WatchStream, SourceError> {
        let mut state = self.state.lock();
        *state.watch_calls.entry(resource.clone()).or_insert(0) += 1;
        let revision = state.revision;

        if !state.collections.contains_key(resource) {
            if self.strict {
                return Err(Self::not_found(resource));
            }
            state.collections.insert(resource.clone(), Collection::new());
        }
        let collection = state
            .collections
            .get_mut(resource)
            .ok_or_else(|| Self::not_found(resource))?;

        if let Some(e) = &collection.rejection {
            return Err(e.clone());
        }

        let since = if params.resource_version.is_empty() {
            revision
        } else {
            params.resource_version.parse::<u64>().map_err(|_| {
                SourceError::Invalid(format!(
                    "resource version `{}` is not a number",
                    params.resource_version
                ))
            })?
        };
        if since < collection.compacted {
            return Err(SourceError::Expired(format!(
                "requested {}, oldest available is {}",
                since,
                collection.compacted + 1
            )));
        }

        let namespace = params.namespace.clone();
        let backlog: Vec<_> = collection
            .history
            .iter()
            .filter(|(rv, event)| *rv > since && in_namespace(event, &namespace))
            .map(|(_, event)| Ok(event.clone()))
            .collect();

        // Subscribed under the lock, so nothing falls between backlog and live events.
        let live = BroadcastStream::new(collection.sender.subscribe()).filter_map(move |item| {
            let out = match item {
                Ok(Ok(event)) => {
                    let newer = event
                        .resource_version()
                        .parse::<u64>()
                        .map(|rv| rv > since)
                        .unwrap_or(true);
                    (newer && in_namespace(&event, &namespace)).then_some(Ok(event))
                }
                Ok(Err(e)) => Some(Err(e)),
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    Some(Err(SourceError::Expired(format!("watcher lagged by {} events", n))))
                }
            };
            future::ready(out)
        });

        Ok(stream::iter(backlog).chain(live).boxed())
    }
}
