use std::net::SocketAddr;
use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref WATCHES_STARTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("watches_started_total", "Reflectors started per resource type"),
        &["resource"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_failures_total", "Watches torn down after an unrecoverable failure"),
        &["resource", "reason"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_total", "Watch events applied to mirrors"),
        &["resource", "event_type"]
    )
    .expect("metric can not be created");

    pub static ref MIRROR_OBJECTS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("mirror_objects", "Objects currently held per mirror"),
        &["resource"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHES: IntGauge =
        IntGauge::new("active_watches", "Watch handles in the active registry")
            .expect("metric can not be created");

    pub static ref QUARANTINED_RESOURCES: IntGauge =
        IntGauge::new("quarantined_resources", "Resource types quarantined after a watch failure")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_ONCE: Once = Once::new();

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(WATCHES_STARTED_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_FAILURES_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCH_EVENTS_TOTAL.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(MIRROR_OBJECTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ACTIVE_WATCHES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(QUARANTINED_RESOURCES.clone()))
        .expect("collector can be registered");
}

/// Serve `/metrics` until `shutdown_signal` changes.
pub async fn start_server(
    addr: SocketAddr,
    mut shutdown_signal: watch::Receiver<()>,
) {
    REGISTER_ONCE.call_once(|| register_custom_metrics(&REGISTRY));

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    info!("metrics server listening on {}", addr);
    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(encode(&REGISTRY))
}

pub(crate) fn encode(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
