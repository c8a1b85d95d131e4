//! Lazily started, per-resource-type watches with failure quarantine.
//!
//! ## Key Responsibilities
//! - Starts at most one [`Reflector`] per resource type, on first use
//! - Hands out [`Lister`]s over each type's mirror
//! - Quarantines types whose watch failed so they are never retried
//! - Tears every watch down once on shutdown
//!
//! ## Example Usage
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use dynamic_cache::*;
//! # use tokio_util::sync::CancellationToken;
//! # async fn demo(source: Arc<dyn ListWatch>) -> Result<()> {
//! let config = DynamicCacheConfig::default();
//! let cache = DynamicCache::new(source, "default", &config, CancellationToken::new());
//!
//! let deployments: ResourceType = "apps/v1/deployments".parse()?;
//! cache.watch(&deployments)?;
//! cache.wait_for_initial_sync_timeout(config.cache.sync_timeout()).await?;
//!
//! let lister = cache.lister_for_resource(&deployments)?;
//! let nginx = lister.namespaced("default").get("nginx-deployment");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Coordinator;
use super::ErrorReporter;
use super::Registry;
use super::RemovalRequest;
use super::StopSignal;
use super::WatchHandle;
use crate::metrics::WATCHES_STARTED_TOTAL;
use crate::CacheError;
use crate::DynamicCacheConfig;
use crate::ListWatch;
use crate::Lister;
use crate::Reflector;
use crate::ReflectorConfig;
use crate::ResourceEventHandler;
use crate::ResourceType;
use crate::Result;
use crate::WatchErrorHandler;

pub struct DynamicCache {
    source: Arc<dyn ListWatch>,
    namespace: String,
    reflector_config: ReflectorConfig,

    pub(crate) registry: Arc<Registry>,
    pub(crate) removal_tx: mpsc::Sender<RemovalRequest>,

    shutdown: CancellationToken,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DynamicCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DynamicCache")
            .field("namespace", &self.namespace)
            .field("watched", &self.watched_resources())
            .field("quarantined", &self.quarantined_resources())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl DynamicCache {
    /// Create the cache and spawn its lifecycle coordinator.
    ///
    /// Cancelling `shutdown` (or calling [`DynamicCache::shutdown`]) stops
    /// every watch. A `removal_queue_size` of 0 is treated as 1. Must be called
    /// from within a tokio runtime.
    pub fn new(
        source: Arc<dyn ListWatch>,
        namespace: impl Into<String>,
        config: &DynamicCacheConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let (removal_tx, removal_rx) = mpsc::channel(config.cache.removal_queue_size.max(1));
        let shutdown = shutdown.child_token();

        let coordinator = Coordinator::new(
            registry.clone(),
            removal_rx,
            shutdown.clone(),
            config.cache.coordinator_tick(),
        );
        let coordinator = tokio::spawn(coordinator.run());

        Self {
            source,
            namespace: namespace.into(),
            reflector_config: config.reflector.clone(),
            registry,
            removal_tx,
            shutdown,
            coordinator: Mutex::new(Some(coordinator)),
        }
    }

    /// Make sure `resource` is being watched.
    pub fn watch(
        &self,
        resource: &ResourceType,
    ) -> Result<()> {
        self.handle_for(resource).map(|_| ())
    }

    /// Read access to the mirror of `resource`, starting its watch if needed.
    ///
    /// Fails with [`CacheError::Unavailable`] once the type is quarantined.
    pub fn lister_for_resource(
        &self,
        resource: &ResourceType,
    ) -> Result<Lister> {
        let handle = self.handle_for(resource)?;
        Ok(handle.reflector.lister())
    }

    /// Attach `handler` to the mirror of `resource`, starting its watch if
    /// needed. Objects already mirrored are replayed as adds.
    pub fn add_event_handler(
        &self,
        resource: &ResourceType,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Result<()> {
        let handle = self.handle_for(resource)?;
        handle.reflector.store().add_handler(handler);
        Ok(())
    }

    /// Wait for every watch registered right now to finish its first list.
    ///
    /// Returns false as soon as one of them is stopped before syncing. Watches
    /// added while this is waiting are not covered.
    pub async fn wait_for_initial_sync(&self) -> bool {
        let handles = self.registry.snapshot();
        debug!(watches = handles.len(), "waiting for initial sync");

        for handle in handles {
            if !handle.wait_synced().await {
                warn!(resource = %handle.resource, "watch stopped before initial sync");
                return false;
            }
        }
        true
    }

    pub async fn wait_for_initial_sync_timeout(
        &self,
        duration: Duration,
    ) -> Result<()> {
        match timeout(duration, self.wait_for_initial_sync()).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(CacheError::SyncTimeout(duration).into()),
        }
    }

    pub fn is_quarantined(
        &self,
        resource: &ResourceType,
    ) -> bool {
        self.registry.is_quarantined(resource)
    }

    pub fn is_watching(
        &self,
        resource: &ResourceType,
    ) -> bool {
        self.registry.active.contains_key(resource)
    }

    pub fn watched_resources(&self) -> Vec<ResourceType> {
        let mut resources: Vec<ResourceType> = self.registry.active.iter().map(|e| e.key().clone()).collect();
        resources.sort();
        resources
    }

    pub fn quarantined_resources(&self) -> Vec<ResourceType> {
        let mut resources: Vec<ResourceType> = self.registry.quarantined.iter().map(|r| r.key().clone()).collect();
        resources.sort();
        resources
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop every watch and wait for the coordinator to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let coordinator = self.coordinator.lock().take();
        if let Some(coordinator) = coordinator {
            if let Err(e) = coordinator.await {
                warn!("lifecycle coordinator ended abnormally: {:?}", e);
            }
        }
    }

    /// Get or create the handle for `resource`.
    ///
    /// The quarantine and shutdown checks run while the registry entry is
    /// locked, and the coordinator quarantines before it removes, so a type
    /// that failed can never be started again.
    fn handle_for(
        &self,
        resource: &ResourceType,
    ) -> Result<WatchHandle> {
        // A quarantined type may still be in `active` until the coordinator
        // removes it.
        if self.registry.is_quarantined(resource) {
            return Err(CacheError::Unavailable(resource.clone()).into());
        }
        if let Some(handle) = self.registry.active.get(resource) {
            return Ok(handle.value().clone());
        }

        let handle = match self.registry.active.entry(resource.clone()) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                if self.registry.is_quarantined(resource) {
                    return Err(CacheError::Unavailable(resource.clone()).into());
                }
                if self.shutdown.is_cancelled() {
                    return Err(CacheError::ShutDown.into());
                }

                let handle = self.start_watch(resource);
                Registry::admit(entry, handle.clone());
                handle
            }
        };

        WATCHES_STARTED_TOTAL
            .with_label_values(&[resource.to_path().as_str()])
            .inc();
        info!(%resource, namespace = %self.namespace, "watch started");

        Ok(handle)
    }

    fn start_watch(
        &self,
        resource: &ResourceType,
    ) -> WatchHandle {
        let reflector = Arc::new(Reflector::new(
            resource.clone(),
            self.namespace.clone(),
            self.source.clone(),
            self.reflector_config.clone(),
        ));
        let stop = StopSignal::new(self.shutdown.child_token());
        let reporter: Arc<dyn WatchErrorHandler> =
            Arc::new(ErrorReporter::new(resource.clone(), self.removal_tx.clone()));

        let task_reflector = reflector.clone();
        let token = stop.token();
        tokio::spawn(async move {
            task_reflector.run(token, reporter).await;
        });

        WatchHandle {
            resource: resource.clone(),
            stop,
            reflector,
        }
    }
}

impl Drop for DynamicCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
