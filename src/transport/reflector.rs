use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use futures::StreamExt;
#[cfg(test)]
use mockall::automock;
use rand::Rng;
use tokio::sync::watch;
use tokio::time::interval_at;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::ListParams;
use super::ListWatch;
use super::WatchEvent;
use crate::metrics::MIRROR_OBJECTS;
use crate::metrics::WATCH_EVENTS_TOTAL;
use crate::Lister;
use crate::MirrorStore;
use crate::ReflectorConfig;
use crate::ResourceType;
use crate::SourceError;

/// Hook invoked once when a reflector gives up on its watch.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WatchErrorHandler: Send + Sync + 'static {
    async fn on_watch_error(
        &self,
        resource: &ResourceType,
        error: SourceError,
    );
}

/// Keeps one [`MirrorStore`] in step with the remote collection.
pub struct Reflector {
    resource: ResourceType,
    namespace: String,
    source: Arc<dyn ListWatch>,
    store: MirrorStore,
    config: ReflectorConfig,
    synced_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Reflector {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Reflector")
            .field("resource", &self.resource)
            .field("namespace", &self.namespace)
            .field("synced", &self.has_synced())
            .finish_non_exhaustive()
    }
}

impl Reflector {
    pub fn new(
        resource: ResourceType,
        namespace: impl Into<String>,
        source: Arc<dyn ListWatch>,
        config: ReflectorConfig,
    ) -> Self {
        let (synced_tx, _) = watch::channel(false);
        Self {
            store: MirrorStore::new(resource.clone()),
            resource,
            namespace: namespace.into(),
            source,
            config,
            synced_tx,
        }
    }

    pub fn resource(&self) -> &ResourceType {
        &self.resource
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    pub fn lister(&self) -> Lister {
        self.store.lister()
    }

    /// True once the first list has been loaded into the store. Never reset.
    pub fn has_synced(&self) -> bool {
        *self.synced_tx.borrow()
    }

    pub fn subscribe_synced(&self) -> watch::Receiver<bool> {
        self.synced_tx.subscribe()
    }

    /// Run list-and-watch until `stop` fires or the watch fails for good.
    ///
    /// On a final failure `on_error` is awaited once and the loop exits.
    pub async fn run(
        &self,
        stop: CancellationToken,
        on_error: Arc<dyn WatchErrorHandler>,
    ) {
        debug!(resource = %self.resource, namespace = %self.namespace, "reflector started");
        let mut failures = 0usize;

        loop {
            let err = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                err = self.list_and_watch(&stop, &mut failures) => err,
            };

            let Some(err) = err else { break };
            match err {
                SourceError::Expired(reason) => {
                    debug!(resource = %self.resource, %reason, "resource version expired, relisting");
                }
                e if e.is_retryable() && failures < self.config.backoff.max_retries => {
                    failures += 1;
                    let delay = self.backoff_delay(failures);
                    warn!(
                        resource = %self.resource,
                        error = %e,
                        attempt = failures,
                        ?delay,
                        "list/watch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }
                e => {
                    error!(resource = %self.resource, error = %e, "error starting watcher");
                    on_error.on_watch_error(&self.resource, e).await;
                    break;
                }
            }
        }

        debug!(resource = %self.resource, "reflector stopped");
    }

    /// One list followed by watches until something breaks. Returns what broke
    /// it, or `None` once `stop` fires.
    async fn list_and_watch(
        &self,
        stop: &CancellationToken,
        failures: &mut usize,
    ) -> Option<SourceError> {
        let list_timeout = self.config.backoff.timeout();
        let params = ListParams {
            namespace: self.namespace.clone(),
            resource_version: String::new(),
        };

        let list = match timeout(list_timeout, self.source.list(&self.resource, &params)).await {
            Ok(Ok(list)) => list,
            Ok(Err(e)) => return Some(e),
            Err(_) => return Some(SourceError::Timeout(list_timeout)),
        };

        let mut resource_version = list.resource_version;
        self.store.replace(list.items);
        *failures = 0;
        self.record_size();

        if !self.has_synced() {
            self.synced_tx.send_replace(true);
            info!(
                resource = %self.resource,
                objects = self.store.len(),
                resource_version = %resource_version,
                "initial sync complete"
            );
        }

        let mut resync = self.resync_interval();
        let mut empty_closes = 0usize;
        loop {
            if stop.is_cancelled() {
                return None;
            }
            let params = ListParams {
                namespace: self.namespace.clone(),
                resource_version: resource_version.clone(),
            };
            let mut stream = match self.source.watch(&self.resource, &params).await {
                Ok(stream) => stream,
                Err(e) => return Some(e),
            };
            trace!(resource = %self.resource, %resource_version, "watch opened");

            let mut delivered = 0usize;
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => return None,
                    _ = next_resync(&mut resync) => {
                        trace!(resource = %self.resource, "resync");
                        self.store.resync();
                    }
                    item = stream.next() => match item {
                        Some(Ok(event)) => {
                            if !event.resource_version().is_empty() {
                                resource_version = event.resource_version().to_string();
                            }
                            delivered += 1;
                            self.apply(event);
                        }
                        Some(Err(e)) => return Some(e),
                        None => {
                            debug!(resource = %self.resource, %resource_version, delivered, "watch closed, resuming");
                            break;
                        }
                    }
                }
            }

            // A stream that closes without delivering anything is retried with backoff.
            if delivered == 0 {
                empty_closes += 1;
                let delay = self.backoff_delay(empty_closes);
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => return None,
                    _ = sleep(delay) => {}
                }
            } else {
                empty_closes = 0;
                tokio::task::yield_now().await;
            }
        }
    }

    fn apply(
        &self,
        event: WatchEvent,
    ) {
        let path = self.resource.to_path();
        WATCH_EVENTS_TOTAL
            .with_label_values(&[path.as_str(), event.kind()])
            .inc();
        self.store.apply(event);
        self.record_size();
    }

    fn record_size(&self) {
        MIRROR_OBJECTS
            .with_label_values(&[self.resource.to_path().as_str()])
            .set(self.store.len() as i64);
    }

    fn resync_interval(&self) -> Option<Interval> {
        self.config.resync_period().map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        })
    }

    /// Exponential delay plus up to 10% jitter.
    fn backoff_delay(
        &self,
        attempt: usize,
    ) -> Duration {
        let base = self.config.backoff.delay_for(attempt);
        let spread = (base.as_millis() as u64 / 10).max(1);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..spread))
    }
}

async fn next_resync(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
