//! Integration tests: live listing ordering, reload and teardown.

mod common;

use common::{ids, init_tracing, project, settle, ScriptedStore};
use devduo_core::{Collection, ListingPhase, LiveListing, RecordStore};
use std::sync::Arc;
use std::time::Duration;

fn listing(store: &Arc<ScriptedStore>) -> LiveListing {
    let store: Arc<dyn RecordStore> = store.clone();
    LiveListing::new(store, Collection::Projects, Duration::from_millis(50))
}

#[tokio::test]
async fn stale_response_never_overwrites_newer_load() {
    init_tracing();
    let store = Arc::new(ScriptedStore::new());
    store.set_rows(Collection::Projects, vec![project("old", None, 5)]);
    let listing = Arc::new(listing(&store));

    // Load A snapshots "old" and parks.
    let release_a = store.hold_next_query(Collection::Projects);
    let a = {
        let listing = Arc::clone(&listing);
        tokio::spawn(async move { listing.load().await })
    };
    while store.queries() < 1 {
        tokio::task::yield_now().await;
    }

    // Load B is issued after A and resolves first.
    store.set_rows(
        Collection::Projects,
        vec![project("new", None, 1), project("old", None, 5)],
    );
    assert!(listing.load().await.unwrap());

    release_a.send(()).unwrap();
    assert!(!a.await.unwrap().unwrap(), "superseded load must be discarded");

    let state = listing.snapshot();
    assert_eq!(ids(&state.records), vec!["new", "old"]);
    assert_eq!(state.applied_load, 2);
    assert_eq!(state.phase, ListingPhase::Ready);
}

#[tokio::test]
async fn dropped_load_caller_still_settles_to_ready() {
    init_tracing();
    let store = Arc::new(ScriptedStore::new());
    store.set_rows(Collection::Projects, vec![project("old", None, 5)]);
    let listing = Arc::new(listing(&store));
    let mut rx = listing.subscribe();
    assert!(listing.load().await.unwrap());

    // Load A parks on the original rows.
    let release_a = store.hold_next_query(Collection::Projects);
    let a = {
        let listing = Arc::clone(&listing);
        tokio::spawn(async move { listing.load().await })
    };
    while store.queries() < 2 {
        tokio::task::yield_now().await;
    }

    // Load B parks too, and its caller gives up waiting.
    store.set_rows(
        Collection::Projects,
        vec![project("new", None, 1), project("old", None, 5)],
    );
    let release_b = store.hold_next_query(Collection::Projects);
    let gave_up = tokio::time::timeout(Duration::from_millis(20), listing.load()).await;
    assert!(gave_up.is_err());
    assert_eq!(listing.snapshot().phase, ListingPhase::Refreshing);

    release_a.send(()).unwrap();
    assert!(!a.await.unwrap().unwrap(), "A was superseded by B");
    release_b.send(()).unwrap();

    let state = settle(&mut rx, |s| s.phase == ListingPhase::Ready && s.applied_load == 3).await;
    assert_eq!(ids(&state.records), vec!["new", "old"]);
    assert!(state.last_error.is_none());
}

#[tokio::test]
async fn notification_burst_converges_on_authoritative_state() {
    init_tracing();
    let store = Arc::new(ScriptedStore::new());
    store.set_rows(Collection::Projects, vec![project("p1", Some("AI/ML"), 10)]);

    let mut listing = listing(&store);
    let mut rx = listing.subscribe();
    listing.start_watching().await.unwrap();
    settle(&mut rx, |s| s.phase == ListingPhase::Ready).await;

    store.set_rows(
        Collection::Projects,
        vec![
            project("p3", None, 1),
            project("p2", Some("Mobile App"), 2),
            project("p1", Some("AI/ML"), 10),
        ],
    );
    store.notify(Collection::Projects, 5);

    let state = settle(&mut rx, |s| s.records.len() == 3 && s.phase == ListingPhase::Ready).await;
    let authoritative = store
        .query(Collection::Projects, devduo_core::RecordQuery::newest_first())
        .await
        .unwrap();
    assert_eq!(ids(&state.records), ids(&authoritative));
    assert_eq!(state.records[0].category(), "other");

    // Settles: no further writes after the burst is drained.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ids(&listing.snapshot().records), ids(&authoritative));
    listing.teardown();
}

#[tokio::test]
async fn failed_reload_keeps_previous_records() {
    init_tracing();
    let store = Arc::new(ScriptedStore::new());
    store.set_rows(Collection::Projects, vec![project("p1", None, 3)]);
    let listing = listing(&store);
    assert!(listing.load().await.unwrap());

    store.fail(Collection::Projects);
    assert!(listing.load().await.is_err());
    let state = listing.snapshot();
    assert_eq!(ids(&state.records), vec!["p1"]);
    assert!(state.last_error.is_some());
    assert_eq!(state.phase, ListingPhase::Ready);

    store.recover(Collection::Projects);
    assert!(listing.load().await.unwrap());
    assert!(listing.snapshot().last_error.is_none());
}

#[tokio::test]
async fn teardown_releases_subscription_and_freezes_state() {
    init_tracing();
    let store = Arc::new(ScriptedStore::new());
    store.set_rows(Collection::Projects, vec![project("p1", None, 3)]);

    // Initial load parks, so it is still in flight at teardown.
    let release = store.hold_next_query(Collection::Projects);
    let mut listing = listing(&store);
    let rx = listing.subscribe();
    listing.start_watching().await.unwrap();
    assert_eq!(store.subscriber_count(), 1);
    while store.queries() < 1 {
        tokio::task::yield_now().await;
    }

    listing.teardown();
    assert_eq!(store.subscriber_count(), 0);

    let _ = release.send(());
    store.notify(Collection::Projects, 3);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = rx.borrow().clone();
    assert_eq!(state.phase, ListingPhase::Loading);
    assert!(state.records.is_empty());
}

#[tokio::test]
async fn stop_and_restart_watching() {
    let store = Arc::new(ScriptedStore::new());
    let mut listing = listing(&store);
    listing.start_watching().await.unwrap();
    listing.start_watching().await.unwrap();
    assert_eq!(store.subscriber_count(), 1);

    listing.stop_watching();
    assert!(!listing.is_watching());
    assert_eq!(store.subscriber_count(), 0);

    listing.start_watching().await.unwrap();
    assert_eq!(store.subscriber_count(), 1);
}

#[tokio::test]
async fn category_filter_is_immediate_and_transition_clears() {
    let store = Arc::new(ScriptedStore::new());
    store.set_rows(
        Collection::Projects,
        vec![
            project("web", Some("Web Development"), 1),
            project("loose", None, 2),
        ],
    );
    let store_dyn: Arc<dyn RecordStore> = store.clone();
    let listing = LiveListing::new(store_dyn, Collection::Projects, Duration::from_millis(100));
    listing.load().await.unwrap();

    listing.select_category("other");
    let state = listing.snapshot();
    assert!(state.is_transitioning);
    assert_eq!(ids(&listing.visible()), vec!["loose"]);

    // A second selection restarts the interval; the first timer must not clear it.
    tokio::time::sleep(Duration::from_millis(60)).await;
    listing.select_category("All");
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(listing.snapshot().is_transitioning);
    assert_eq!(listing.visible().len(), 2);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!listing.snapshot().is_transitioning);
}

#[tokio::test]
async fn categories_fall_back_until_records_arrive() {
    let store = Arc::new(ScriptedStore::new());
    let listing = listing(&store);
    assert_eq!(listing.categories().len(), devduo_core::FALLBACK_CATEGORIES.len());

    store.set_rows(Collection::Projects, vec![project("p", Some("Blockchain"), 1)]);
    listing.load().await.unwrap();
    assert_eq!(listing.categories(), vec!["All", "Blockchain"]);
}
