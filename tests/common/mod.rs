use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dynamic_cache::DynamicCache;
use dynamic_cache::DynamicCacheConfig;
use dynamic_cache::MemorySource;
use dynamic_cache::ResourceType;
use tokio::time::sleep;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const WAIT_FOR_SYNC: Duration = Duration::from_secs(5);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join("fixtures")
}

pub fn gvr(path: &str) -> ResourceType {
    path.parse().expect("valid resource type")
}

pub fn test_config() -> DynamicCacheConfig {
    let mut config = DynamicCacheConfig::default();
    config.cache.coordinator_tick_ms = 10;
    config.reflector.resync_period_secs = 0;
    config.reflector.backoff.base_delay_ms = 5;
    config.reflector.backoff.max_delay_ms = 20;
    config
}

pub fn fixture_cache(shutdown: CancellationToken) -> (Arc<MemorySource>, DynamicCache) {
    enable_logger();
    let source = Arc::new(MemorySource::from_fixture_dir(fixture_dir()).expect("fixtures load"));
    let cache = DynamicCache::new(source.clone(), "default", &test_config(), shutdown);
    (source, cache)
}

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
