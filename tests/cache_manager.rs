mod common;

use common::{overview, progress, MockTransport, JOB_ID};
use judgeboard::api::Method;
use judgeboard::sync::{queries, FetchStatus, SyncConfig};
use judgeboard::CacheManager;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_gc_sweep_evicts_idle_entries() {
    let transport = MockTransport::new();
    transport.ok(Method::Get, "/stats/overview", overview(4));
    let config = SyncConfig {
        gc_delay: Duration::from_secs(10),
        gc_sweep_interval: Duration::from_secs(5),
        ..SyncConfig::default()
    };
    let mut manager = CacheManager::with_transport(transport.clone(), config);
    manager.start_gc();

    let query = queries::stats_overview();
    let entry = manager.cache().get(&query).await;
    assert_eq!(entry.status, FetchStatus::Success);

    tokio::time::sleep(Duration::from_secs(8)).await;
    assert!(manager.cache().peek(&query.key).is_some());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(manager.cache().peek(&query.key).is_none());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_watch_job_uses_configured_interval() {
    let transport = MockTransport::new();
    let path = format!("/jobs/{JOB_ID}/progress");
    transport.ok(Method::Get, &path, progress(25.0, "running"));
    let config = SyncConfig {
        poll_interval: Duration::from_millis(500),
        ..SyncConfig::default()
    };
    let manager = CacheManager::with_transport(transport.clone(), config);

    let subscription = manager.watch_job(JOB_ID);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(transport.count(Method::Get, &path), 3);

    drop(subscription);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.count(Method::Get, &path), 3);
}
