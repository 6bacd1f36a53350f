mod common;

use common::{cache_with, cache_with_timeout, conversation, overview, page, settle, MockTransport, Reply, CONV_ID};
use judgeboard::api::models::{Category, Conversation, Page, StatsOverview};
use judgeboard::api::Method;
use judgeboard::error::ErrorKind;
use judgeboard::sync::{queries, Family, FetchStatus, KeyPrefix, ListParams};
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_concurrent_reads_share_one_call() {
    let transport = MockTransport::new();
    let gate = transport.gate(Method::Get, "/conversations");
    let cache = cache_with(&transport);
    let query = queries::conversations(&ListParams::default());

    let first = tokio::spawn({
        let (cache, query) = (cache.clone(), query.clone());
        async move { cache.get(&query).await }
    });
    let second = tokio::spawn({
        let (cache, query) = (cache.clone(), query.clone());
        async move { cache.get(&query).await }
    });
    let subscription = cache.subscribe(&query);
    settle().await;

    assert_eq!(transport.count(Method::Get, "/conversations"), 1);
    assert_eq!(subscription.snapshot().status, FetchStatus::Fetching);

    gate.send(page(vec![conversation(CONV_ID)])).unwrap();
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first.status, FetchStatus::Success);
    assert_eq!(first.version, second.version);
    assert_eq!(first.get::<Page<Conversation>>().unwrap().items.len(), 1);
    assert_eq!(transport.count(Method::Get, "/conversations"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_filters_are_distinct_entries() {
    let transport = MockTransport::new();
    transport.ok(Method::Get, "/conversations", page(vec![conversation(CONV_ID)]));
    let cache = cache_with(&transport);

    let retoure = queries::conversations(&ListParams::default().category(Category::Retoure));
    let beschwerde = queries::conversations(&ListParams::default().category(Category::Beschwerde));
    assert_ne!(retoure.key, beschwerde.key);

    cache.get(&retoure).await;
    cache.get(&beschwerde).await;

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    let categories: Vec<_> = calls
        .iter()
        .filter_map(|c| c.request.query.iter().find(|(k, _)| k == "category"))
        .map(|(_, v)| v.as_str())
        .collect();
    assert_eq!(categories, ["retoure", "beschwerde"]);

    assert_eq!(cache.stats().total_entries, 2);
    assert_eq!(cache.stats().success_entries, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_while_error_keeps_last_good_data() {
    let transport = MockTransport::new();
    transport.ok(Method::Get, "/stats/overview", overview(5));
    transport.fail(Method::Get, "/stats/overview", 500, json!({"detail": "db error"}));
    let cache = cache_with(&transport);
    let query = queries::stats_overview();

    let fresh = cache.get(&query).await;
    assert_eq!(fresh.status, FetchStatus::Success);

    tokio::time::advance(Duration::from_secs(31)).await;
    let failed = cache.get(&query).await;

    assert_eq!(failed.status, FetchStatus::Error);
    assert_eq!(failed.get::<StatsOverview>().unwrap().total_evaluations, 5);
    let warning = failed.stale_data_warning().unwrap();
    assert_eq!(warning.error.message, "db error");
    assert_eq!(warning.error.status, Some(500));

    let err = cache.load(&query).await.unwrap_err();
    assert_eq!(err.to_string(), "db error");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_resolves_to_error_state() {
    let transport = MockTransport::new();
    transport.push(Method::Get, "/stats/overview", Reply::Hang);
    let cache = cache_with_timeout(&transport, Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let entry = cache.get(&queries::stats_overview()).await;

    assert_eq!(entry.status, FetchStatus::Error);
    assert_eq!(entry.error.unwrap().kind, ErrorKind::Timeout);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(!cache.peek(&queries::stats_overview().key).unwrap().is_fetching());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_query_never_fetches() {
    let transport = MockTransport::new();
    let cache = cache_with(&transport);

    let entry = cache.get(&queries::conversation("")).await;
    assert_eq!(entry.status, FetchStatus::Idle);

    let subscription = cache.subscribe(&queries::job_progress("  ", Duration::from_millis(2000)));
    assert!(!subscription.is_active());
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(transport.calls().is_empty());
    assert_eq!(cache.stats().total_entries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_of_superseded_call_is_dropped() {
    let transport = MockTransport::new();
    let first = transport.gate(Method::Get, "/stats/overview");
    let second = transport.gate(Method::Get, "/stats/overview");
    let cache = cache_with(&transport);
    let query = queries::stats_overview();

    let mut subscription = cache.subscribe(&query);
    settle().await;
    assert_eq!(transport.count(Method::Get, "/stats/overview"), 1);

    cache.invalidate(&KeyPrefix::family(Family::Stats));
    settle().await;
    assert_eq!(transport.count(Method::Get, "/stats/overview"), 2);

    second.send(overview(2)).unwrap();
    let entry = subscription
        .wait_for(|e| e.status == FetchStatus::Success)
        .await
        .unwrap();
    assert_eq!(entry.get::<StatsOverview>().unwrap().total_evaluations, 2);

    // the older call was cancelled when it was superseded
    let _ = first.send(overview(1));
    settle().await;

    let current = cache.peek(&query.key).unwrap();
    assert_eq!(current.get::<StatsOverview>().unwrap().total_evaluations, 2);
    assert_eq!(current.version, entry.version);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_discards_in_flight_result() {
    let transport = MockTransport::new();
    let gate = transport.gate(Method::Get, "/stats/overview");
    let cache = cache_with(&transport);
    let query = queries::stats_overview();

    let subscription = cache.subscribe(&query);
    settle().await;
    subscription.unsubscribe();

    let _ = gate.send(overview(9));
    settle().await;

    let entry = cache.peek(&query.key).unwrap();
    assert_eq!(entry.status, FetchStatus::Error);
    assert_eq!(entry.error.unwrap().kind, ErrorKind::Cancelled);
    assert!(entry.data.is_none());
    assert_eq!(cache.subscriber_count(&query.key), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_marks_unsubscribed_entries_without_fetching() {
    let transport = MockTransport::new();
    transport.ok(Method::Get, "/stats/overview", overview(1));
    transport.ok(Method::Get, "/stats/timeseries", json!({"data": []}));
    let cache = cache_with(&transport);

    cache.get(&queries::stats_overview()).await;
    cache.get(&queries::stats_timeseries(7)).await;

    assert_eq!(cache.invalidate(&KeyPrefix::family(Family::Stats)), 2);
    settle().await;

    assert_eq!(transport.calls().len(), 2);
    let overview = cache.peek(&queries::stats_overview().key).unwrap();
    assert!(overview.invalidated);
    assert!(overview.is_stale());

    // next read refetches even though the 30s window has not elapsed
    cache.get(&queries::stats_overview()).await;
    assert_eq!(transport.count(Method::Get, "/stats/overview"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_subscription_stream_follows_updates() {
    use futures::StreamExt;

    let transport = MockTransport::new();
    transport.ok(Method::Get, "/rubrics", json!({"items": []}));
    let cache = cache_with(&transport);
    let query = queries::rubrics();

    let mut stream = cache.subscribe(&query).into_stream();
    let mut seen = Vec::new();
    while let Some(entry) = stream.next().await {
        seen.push(entry.status);
        if entry.status == FetchStatus::Success {
            break;
        }
    }
    assert_eq!(seen.last(), Some(&FetchStatus::Success));
    assert_eq!(cache.subscriber_count(&query.key), 1);

    drop(stream);
    assert_eq!(cache.subscriber_count(&query.key), 0);
}
