use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Registry;
use super::RemovalRequest;
use crate::metrics::WATCH_FAILURES_TOTAL;
use crate::CacheError;

/// Single writer for removals and quarantine.
///
/// Handles one event per iteration, in priority order: shutdown, then a
/// pending removal request, then an idle tick.
pub(crate) struct Coordinator {
    registry: Arc<Registry>,
    requests: mpsc::Receiver<RemovalRequest>,
    shutdown: CancellationToken,
    tick: Duration,
}

impl Coordinator {
    pub(crate) fn new(
        registry: Arc<Registry>,
        requests: mpsc::Receiver<RemovalRequest>,
        shutdown: CancellationToken,
        tick: Duration,
    ) -> Self {
        Self {
            registry,
            requests,
            shutdown,
            tick,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(tick = ?self.tick, "lifecycle coordinator started");

        loop {
            tokio::select! {
                biased;

                // P0: shutdown
                _ = self.shutdown.cancelled() => {
                    self.stop_all();
                    break;
                }

                // P1: removal requests
                Some(request) = self.requests.recv() => {
                    self.handle_removal(request);
                }

                // P2: idle
                _ = sleep(self.tick) => {
                    trace!("coordinator tick");
                }
            }
        }

        // Anything still queued refers to handles that stop_all already fired.
        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            trace!(resource = %request.resource, "discarding removal request after shutdown");
        }

        info!("lifecycle coordinator stopped");
    }

    /// Quarantine first, then drop from the registry, so a concurrent creator
    /// holding the entry lock sees either the live handle or the quarantine.
    pub(crate) fn handle_removal(
        &self,
        request: RemovalRequest,
    ) {
        let RemovalRequest { resource, reason } = request;
        WATCH_FAILURES_TOTAL
            .with_label_values(&[resource.to_path().as_str(), reason.reason()])
            .inc();

        if self.registry.quarantine(&resource) {
            let failure = CacheError::TransportFailure {
                resource: resource.clone(),
                source: reason,
            };
            warn!(error = %failure, "quarantining resource type");
        }

        match self.registry.remove(&resource) {
            Some(handle) => {
                if handle.stop.fire() {
                    info!(%resource, "watch stopped and removed from registry");
                }
            }
            None => {
                debug!(%resource, "duplicate removal request ignored");
            }
        }
    }

    pub(crate) fn stop_all(&self) {
        let handles = self.registry.drain();
        let mut fired = 0usize;
        for handle in &handles {
            if handle.stop.fire() {
                fired += 1;
            }
        }
        info!(watches = handles.len(), fired, "stopped all watches");
    }
}
