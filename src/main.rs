use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dynamic_cache::constants::LOG_FILE_NAME;
use dynamic_cache::file_io::open_file_for_append;
use dynamic_cache::metrics;
use dynamic_cache::DynamicCache;
use dynamic_cache::DynamicCacheConfig;
use dynamic_cache::Error;
use dynamic_cache::MemorySource;
use dynamic_cache::Result;
use dynamic_cache::Selector;
use dynamic_cache::SystemError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Watch a set of resource types from JSON fixtures and print their mirrors.
#[derive(Debug, Parser)]
#[command(name = "dynamic-cache", version)]
struct Args {
    /// Extra config file layered over defaults, CONFIG_PATH and environment
    #[arg(long)]
    config: Option<String>,

    /// Fixture directory, overrides `demo.fixture_dir`
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Number of render rounds, overrides `demo.render_rounds`
    #[arg(long)]
    rounds: Option<usize>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = DynamicCacheConfig::new()?;
    if let Some(path) = &args.config {
        settings = settings.with_override_config(path)?;
    }
    if let Some(dir) = args.fixtures {
        settings.demo.fixture_dir = dir;
    }
    if let Some(rounds) = args.rounds {
        settings.demo.render_rounds = rounds;
    }
    let settings = settings.validate()?;

    // Initializing Logs
    let _guard = init_observability(&settings.demo.log_dir)?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());
    let shutdown = CancellationToken::new();

    if settings.monitoring.prometheus_enabled {
        let addr = settings.monitoring.metrics_addr();
        let rx = graceful_rx.clone();
        tokio::spawn(async move { metrics::start_server(addr, rx).await });
    }

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = graceful_shutdown(graceful_tx).await {
                error!("Failed to shutdown: {:?}", e);
            }
            shutdown.cancel();
        }
    });

    let source = Arc::new(MemorySource::from_fixture_dir(&settings.demo.fixture_dir)?);
    let cache = DynamicCache::new(
        source,
        settings.cache.namespace.clone(),
        &settings,
        shutdown.clone(),
    );

    for resource in &settings.cache.resources {
        if let Err(e) = cache.watch(resource) {
            warn!(%resource, "unable to start watch: {}", e);
        }
    }
    println!("started watches");

    if let Err(e) = cache
        .wait_for_initial_sync_timeout(settings.cache.sync_timeout())
        .await
    {
        warn!("not every watch synced: {}", e);
    }

    render(&cache, &settings, &shutdown).await;

    let key = &settings.demo.lookup_key;
    println!("getting {} by key {} ..", settings.demo.highlight, key);
    match cache.lister_for_resource(&settings.demo.highlight) {
        Ok(lister) => match lister.get(key) {
            Some(obj) => match serde_json::to_string_pretty(obj.as_ref()) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("{e}"),
            },
            None => println!("{key} not found"),
        },
        Err(e) => println!("{e}"),
    }

    println!("terminating ...");
    cache.shutdown().await;
    Ok(())
}

async fn render(
    cache: &DynamicCache,
    settings: &DynamicCacheConfig,
    shutdown: &CancellationToken,
) {
    let demo = &settings.demo;
    let everything = Selector::everything();

    for round in 0..demo.render_rounds {
        println!("--- round {} / {} ---", round + 1, demo.render_rounds);
        for resource in &settings.cache.resources {
            let lister = match cache.lister_for_resource(resource) {
                Ok(lister) => lister,
                Err(e) => {
                    println!("unable to get lister: {e}");
                    continue;
                }
            };
            if resource == &demo.highlight {
                for obj in lister.list(&everything) {
                    println!("{} {}", resource, obj.name());
                }
            }
        }
        let quarantined = cache.quarantined_resources();
        if !quarantined.is_empty() {
            println!("quarantined: {}", quarantined.len());
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested, stopping render loop");
                return;
            }
            _ = tokio::time::sleep(demo.render_interval()) => {}
        }
    }
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::System(SystemError::SignalSenderClosed(format!(
            "Failed to send shutdown signal: {}",
            e
        )))
    })?;

    info!("Shutdown completed");
    Ok(())
}

fn init_observability(log_dir: &str) -> Result<WorkerGuard> {
    let (non_blocking, guard) = if log_dir.is_empty() {
        tracing_appender::non_blocking(std::io::stdout())
    } else {
        let log_file = open_file_for_append(Path::new(log_dir).join(LOG_FILE_NAME))?;
        tracing_appender::non_blocking(log_file)
    };

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
