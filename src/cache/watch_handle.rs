use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::Reflector;
use crate::ResourceType;
use crate::SourceError;
use crate::WatchErrorHandler;

/// One-shot cancellation for a single watch.
///
/// `fire` flips an atomic flag before cancelling the token, so only the first
/// caller ever cancels; later calls return `false` and do nothing.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true only for the call that actually fired the signal.
    pub fn fire(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.token.cancel();
            true
        } else {
            false
        }
    }

    /// Whether `fire` has been called. A parent token being cancelled does not
    /// count.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Whether the underlying token is cancelled, by `fire` or by its parent.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// A running watch for one resource type.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    pub(crate) resource: ResourceType,
    pub(crate) stop: StopSignal,
    pub(crate) reflector: Arc<Reflector>,
}

impl WatchHandle {
    pub fn resource(&self) -> &ResourceType {
        &self.resource
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub fn reflector(&self) -> &Arc<Reflector> {
        &self.reflector
    }

    /// Wait until the reflector has synced (true) or the watch is cancelled
    /// first (false).
    pub async fn wait_synced(&self) -> bool {
        let mut synced = self.reflector.subscribe_synced();
        tokio::select! {
            biased;
            result = synced.wait_for(|s| *s) => result.is_ok(),
            _ = self.stop.cancelled() => false,
        }
    }
}

/// Asks the lifecycle coordinator to tear down and quarantine a resource type.
#[derive(Debug, Clone)]
pub struct RemovalRequest {
    pub resource: ResourceType,
    pub reason: SourceError,
}

/// Error hook wired into every reflector the cache starts.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    resource: ResourceType,
    requests: mpsc::Sender<RemovalRequest>,
}

impl ErrorReporter {
    pub(crate) fn new(
        resource: ResourceType,
        requests: mpsc::Sender<RemovalRequest>,
    ) -> Self {
        Self { resource, requests }
    }

    /// Queue a removal request, waiting for capacity if the queue is full.
    pub async fn report(
        &self,
        reason: SourceError,
    ) {
        let request = RemovalRequest {
            resource: self.resource.clone(),
            reason,
        };
        if let Err(e) = self.requests.send(request).await {
            debug!(
                resource = %e.0.resource,
                "coordinator already stopped, dropping removal request"
            );
        }
    }
}

#[async_trait]
impl WatchErrorHandler for ErrorReporter {
    async fn on_watch_error(
        &self,
        resource: &ResourceType,
        error: SourceError,
    ) {
        if resource != &self.resource {
            warn!(
                expected = %self.resource,
                got = %resource,
                "error reported for a different resource type"
            );
        }
        self.report(error).await;
    }
}
