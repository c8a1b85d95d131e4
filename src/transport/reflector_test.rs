use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::test_utils::enable_logger;
use crate::test_utils::eventually;
use crate::test_utils::fast_reflector_config;
use crate::test_utils::object;
use crate::test_utils::pods;
use crate::ObjectList;
use crate::SourceError;

const WITHIN: Duration = Duration::from_secs(5);

fn reflector(source: Arc<dyn ListWatch>) -> Arc<Reflector> {
    Arc::new(Reflector::new(pods(), "default", source, fast_reflector_config()))
}

fn no_errors_expected() -> Arc<MockWatchErrorHandler> {
    let mut handler = MockWatchErrorHandler::new();
    handler.expect_on_watch_error().times(0);
    Arc::new(handler)
}

fn spawn_run(
    reflector: &Arc<Reflector>,
    stop: &CancellationToken,
    on_error: Arc<dyn WatchErrorHandler>,
) -> tokio::task::JoinHandle<()> {
    let reflector = reflector.clone();
    let stop = stop.clone();
    tokio::spawn(async move { reflector.run(stop, on_error).await })
}

#[tokio::test]
async fn test_list_then_watch_keeps_store_in_step() {
    enable_logger();
    let source = Arc::new(MemorySource::new());
    source.seed(&pods(), vec![object("default", "web-0"), object("other", "x")]);
    let reflector = reflector(source.clone());
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, no_errors_expected());

    let mut synced = reflector.subscribe_synced();
    timeout(WITHIN, synced.wait_for(|s| *s)).await.unwrap().unwrap();
    assert!(reflector.has_synced());
    assert_eq!(reflector.store().len(), 1);

    assert!(eventually(WITHIN, || source.watcher_count(&pods()) == 1).await);
    source.apply(&pods(), object("default", "web-1"));
    source.delete(&pods(), "default", "web-0");

    let lister = reflector.lister();
    assert!(
        eventually(WITHIN, || {
            lister.get("default/web-1").is_some() && lister.get("default/web-0").is_none()
        })
        .await
    );

    stop.cancel();
    timeout(WITHIN, runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_closed_watch_resumes_without_relist() {
    enable_logger();
    let source = Arc::new(MemorySource::new());
    source.register(&pods());
    let reflector = reflector(source.clone());
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, no_errors_expected());

    assert!(eventually(WITHIN, || source.watcher_count(&pods()) == 1).await);
    source.close_watches(&pods());

    assert!(eventually(WITHIN, || source.watch_calls(&pods()) == 2).await);
    assert_eq!(source.list_calls(&pods()), 1);

    // Events applied after the close still arrive on the new stream.
    source.apply(&pods(), object("default", "late"));
    assert!(eventually(WITHIN, || reflector.store().len() == 1).await);

    stop.cancel();
    timeout(WITHIN, runner).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streams_closing_empty_back_off_and_honour_stop() {
    enable_logger();
    let watches = Arc::new(AtomicUsize::new(0));

    let mut source = MockListWatch::new();
    source.expect_list().returning(|_, _| Ok(ObjectList::default()));
    let watch_counter = watches.clone();
    source.expect_watch().returning(move |_, _| {
        watch_counter.fetch_add(1, Ordering::SeqCst);
        Ok(stream::empty().boxed())
    });

    let reflector = reflector(Arc::new(source));
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, no_errors_expected());

    assert!(eventually(WITHIN, || watches.load(Ordering::SeqCst) >= 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();

    timeout(Duration::from_secs(1), runner).await.unwrap().unwrap();
    // Base 5ms doubling to a 20ms cap: a handful of reopens, not a spin.
    assert!(watches.load(Ordering::SeqCst) < 50, "{} watch calls", watches.load(Ordering::SeqCst));
    assert!(reflector.has_synced());
}

#[tokio::test]
async fn test_expired_watch_triggers_relist() {
    enable_logger();
    let lists = Arc::new(AtomicUsize::new(0));
    let watches = Arc::new(AtomicUsize::new(0));

    let mut source = MockListWatch::new();
    let list_counter = lists.clone();
    source.expect_list().returning(move |_, _| {
        let n = list_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ObjectList {
            items: vec![object("default", &format!("gen-{n}"))],
            resource_version: (n * 10).to_string(),
        })
    });
    let watch_counter = watches.clone();
    source.expect_watch().returning(move |_, params| {
        let n = watch_counter.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            assert_eq!(params.resource_version, "10");
            Err(SourceError::Expired("too old".into()))
        } else {
            Ok(stream::pending().boxed())
        }
    });

    let reflector = reflector(Arc::new(source));
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, no_errors_expected());

    assert!(eventually(WITHIN, || watches.load(Ordering::SeqCst) == 2).await);
    assert_eq!(lists.load(Ordering::SeqCst), 2);

    // The relist replaced the first generation.
    let lister = reflector.lister();
    assert!(lister.get("default/gen-1").is_none());
    assert!(lister.get("default/gen-2").is_some());

    stop.cancel();
    timeout(WITHIN, runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_retryable_errors_are_retried_then_reported() {
    enable_logger();
    let source = Arc::new(MemorySource::new());
    // max_retries is 2, so the third failure is final.
    source.fail_next_lists(&pods(), 3, SourceError::Unavailable("connection refused".into()));

    let mut handler = MockWatchErrorHandler::new();
    handler
        .expect_on_watch_error()
        .withf(|resource, error| resource == &pods() && matches!(error, SourceError::Unavailable(_)))
        .times(1)
        .returning(|_, _| ());

    let reflector = reflector(source.clone());
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, Arc::new(handler));

    timeout(WITHIN, runner).await.unwrap().unwrap();
    assert_eq!(source.list_calls(&pods()), 3);
    assert!(!reflector.has_synced());
}

#[tokio::test]
async fn test_successful_list_resets_retry_budget() {
    enable_logger();
    let source = Arc::new(MemorySource::new());
    source.fail_next_lists(&pods(), 2, SourceError::Unavailable("flaky".into()));

    let reflector = reflector(source.clone());
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, no_errors_expected());

    assert!(eventually(WITHIN, || reflector.has_synced()).await);
    assert!(eventually(WITHIN, || source.watcher_count(&pods()) == 1).await);

    // Two more failures after a success are still within budget.
    source.fail_next_lists(&pods(), 2, SourceError::Unavailable("flaky".into()));
    source.apply(&pods(), object("default", "after"));
    source.expire_watches(&pods());

    assert!(eventually(WITHIN, || source.list_calls(&pods()) == 6).await);
    assert!(eventually(WITHIN, || reflector.store().len() == 1).await);

    stop.cancel();
    timeout(WITHIN, runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_forbidden_is_reported_immediately() {
    enable_logger();
    let source = Arc::new(MemorySource::new());
    source.reject(&pods(), SourceError::Forbidden("pods is forbidden".into()));

    let mut handler = MockWatchErrorHandler::new();
    handler
        .expect_on_watch_error()
        .withf(|_, error| matches!(error, SourceError::Forbidden(_)))
        .times(1)
        .returning(|_, _| ());

    let reflector = reflector(source.clone());
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, Arc::new(handler));

    timeout(WITHIN, runner).await.unwrap().unwrap();
    assert_eq!(source.list_calls(&pods()), 1);
}

#[tokio::test]
async fn test_stop_before_sync_reports_nothing() {
    enable_logger();
    let source = Arc::new(MemorySource::new());
    let mut policy = fast_reflector_config();
    policy.backoff.base_delay_ms = 10_000;
    policy.backoff.max_delay_ms = 10_000;
    source.fail_next_lists(&pods(), 1, SourceError::Unavailable("down".into()));

    let reflector = Arc::new(Reflector::new(pods(), "default", source.clone(), policy));
    let stop = CancellationToken::new();
    let runner = spawn_run(&reflector, &stop, no_errors_expected());

    assert!(eventually(WITHIN, || source.list_calls(&pods()) == 1).await);
    stop.cancel();

    // Backoff sleep is interrupted.
    timeout(Duration::from_secs(1), runner).await.unwrap().unwrap();
    assert!(!reflector.has_synced());
}
