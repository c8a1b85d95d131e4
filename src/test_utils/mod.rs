//! Helpers shared by the unit tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;
use tokio::time::Instant;

use crate::BackoffPolicy;
use crate::DynamicCacheConfig;
use crate::DynamicObject;
use crate::ReflectorConfig;
use crate::ResourceEventHandler;
use crate::ResourceType;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn deployments() -> ResourceType {
    ResourceType::new("apps", "v1", "deployments")
}

pub fn pods() -> ResourceType {
    ResourceType::core("v1", "pods")
}

pub fn services() -> ResourceType {
    ResourceType::core("v1", "services")
}

pub fn object(
    namespace: &str,
    name: &str,
) -> DynamicObject {
    DynamicObject::new(namespace, name)
}

/// Short timings so failures and retries resolve within a test.
pub fn fast_reflector_config() -> ReflectorConfig {
    ReflectorConfig {
        resync_period_secs: 0,
        backoff: BackoffPolicy {
            max_retries: 2,
            timeout_ms: 500,
            base_delay_ms: 5,
            max_delay_ms: 20,
        },
    }
}

pub fn fast_config() -> DynamicCacheConfig {
    let mut config = DynamicCacheConfig::default();
    config.cache.coordinator_tick_ms = 10;
    config.reflector = fast_reflector_config();
    config
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(
    within: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Like [`eventually`], for async checks.
pub async fn eventually_async<F, Fut>(
    within: Duration,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Records every notification as `"<kind> <key>"`.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl ResourceEventHandler for RecordingHandler {
    fn on_add(
        &self,
        obj: &Arc<DynamicObject>,
    ) {
        self.events.lock().push(format!("add {}", obj.key()));
    }

    fn on_update(
        &self,
        _old: &Arc<DynamicObject>,
        new: &Arc<DynamicObject>,
    ) {
        self.events.lock().push(format!("update {}", new.key()));
    }

    fn on_delete(
        &self,
        obj: &Arc<DynamicObject>,
    ) {
        self.events.lock().push(format!("delete {}", obj.key()));
    }
}
