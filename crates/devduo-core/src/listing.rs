//! Live Listing Controller.
//!
//! Loads a whole collection newest first, keeps it current by reloading on
//! every change notification, and filters the loaded set by category on the
//! client side.
//!
//! ```text
//!   Loading ──load──▶ Ready ──notification──▶ Refreshing ──load──▶ Ready
//! ```
//!
//! Loads carry a monotonically increasing token; only the most recently
//! issued load may write `records`, so a slow stale response can never
//! overwrite newer data. After teardown nothing writes state at all.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{ConsoleError, ConsoleResult};
use crate::record::{ChangeEvent, Collection, Record, RecordQuery};
use crate::store::{RecordStore, SubscriptionHandle};

/// Category that selects every record.
pub const ALL_CATEGORIES: &str = "All";

/// Vocabulary shown while the collection is empty.
pub const FALLBACK_CATEGORIES: [&str; 7] = [
    "All",
    "Web Development",
    "Mobile App",
    "Desktop Application",
    "AI/ML",
    "Blockchain",
    "Other",
];

pub const DEFAULT_TRANSITION: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingPhase {
    Loading,
    Ready,
    Refreshing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingState {
    pub phase: ListingPhase,
    /// Server order, newest first. Replaced wholesale by each applied load.
    pub records: Vec<Record>,
    pub selected_category: String,
    /// Visual affordance only; never delays the filter.
    pub is_transitioning: bool,
    /// Message from the last failed load; cleared by the next applied one.
    pub last_error: Option<String>,
    /// Token of the load whose result is currently shown (0 = none yet).
    pub applied_load: u64,
}

impl Default for ListingState {
    fn default() -> Self {
        Self {
            phase: ListingPhase::Loading,
            records: Vec::new(),
            selected_category: ALL_CATEGORIES.to_string(),
            is_transitioning: false,
            last_error: None,
            applied_load: 0,
        }
    }
}

impl ListingState {
    /// Records passing the category filter, in server order.
    pub fn visible(&self) -> Vec<&Record> {
        if self.selected_category == ALL_CATEGORIES {
            return self.records.iter().collect();
        }
        self.records
            .iter()
            .filter(|r| r.category() == self.selected_category)
            .collect()
    }

    /// "All" followed by the categories present, in order of first appearance.
    pub fn categories(&self) -> Vec<String> {
        if self.records.is_empty() {
            return FALLBACK_CATEGORIES.iter().map(|c| c.to_string()).collect();
        }
        let mut seen = HashSet::new();
        let mut out = vec![ALL_CATEGORIES.to_string()];
        for record in &self.records {
            let category = record.category();
            if seen.insert(category) {
                out.push(category.to_string());
            }
        }
        out
    }
}

struct ListingInner {
    store: Arc<dyn RecordStore>,
    collection: Collection,
    state: watch::Sender<ListingState>,
    issued_loads: AtomicU64,
    issued_transitions: AtomicU64,
    torn_down: AtomicBool,
    transition: Duration,
}

impl ListingInner {
    async fn load(&self) -> ConsoleResult<bool> {
        let token = self.issued_loads.fetch_add(1, Ordering::SeqCst) + 1;

        self.state.send_if_modified(|s| {
            if s.phase == ListingPhase::Ready && !self.torn_down.load(Ordering::SeqCst) {
                s.phase = ListingPhase::Refreshing;
                true
            } else {
                false
            }
        });

        let result = self
            .store
            .query(self.collection, RecordQuery::newest_first())
            .await;

        // Check and write under the channel lock so a newer load cannot slip in between.
        let mut applied = false;
        let mut failure = None;
        self.state.send_if_modified(|s| {
            if self.torn_down.load(Ordering::SeqCst)
                || self.issued_loads.load(Ordering::SeqCst) != token
            {
                return false;
            }
            applied = true;
            s.phase = ListingPhase::Ready;
            match &result {
                Ok(rows) => {
                    s.records = rows.iter().cloned().map(Record::normalize).collect();
                    s.last_error = None;
                    s.applied_load = token;
                }
                Err(e) => {
                    s.last_error = Some(e.to_string());
                    failure = Some(e.to_string());
                }
            }
            true
        });

        if !applied {
            tracing::debug!("[LISTING] Discarded load #{} for {} (superseded or torn down)", token, self.collection);
            return result.map(|_| false);
        }
        if let Some(reason) = failure {
            tracing::warn!("[LISTING] Load #{} of {} failed, keeping previous records: {}", token, self.collection, reason);
        }
        result.map(|rows| {
            tracing::debug!("[LISTING] Applied load #{}: {} {}", token, rows.len(), self.collection);
            true
        })
    }
}

/// Scoped change subscription. Dropping it stops the watcher (and every load
/// it started) and releases the subscription.
struct ListingWatch {
    store: Arc<dyn RecordStore>,
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl Drop for ListingWatch {
    fn drop(&mut self) {
        self.task.abort();
        self.store.unsubscribe(self.handle);
        tracing::debug!("[LISTING] Released {}", self.handle);
    }
}

/// One mounted listing view over one collection.
pub struct LiveListing {
    inner: Arc<ListingInner>,
    watch: Option<ListingWatch>,
}

impl LiveListing {
    pub fn new(store: Arc<dyn RecordStore>, collection: Collection, transition: Duration) -> Self {
        let (state, _) = watch::channel(ListingState::default());
        Self {
            inner: Arc::new(ListingInner {
                store,
                collection,
                state,
                issued_loads: AtomicU64::new(0),
                issued_transitions: AtomicU64::new(0),
                torn_down: AtomicBool::new(false),
                transition,
            }),
            watch: None,
        }
    }

    /// Creates the listing and starts watching its collection.
    pub async fn mount(
        store: Arc<dyn RecordStore>,
        collection: Collection,
        transition: Duration,
    ) -> ConsoleResult<Self> {
        let mut listing = Self::new(store, collection, transition);
        listing.start_watching().await?;
        Ok(listing)
    }

    pub fn collection(&self) -> Collection {
        self.inner.collection
    }

    /// Fetches the whole collection. Returns `Ok(false)` when the result was
    /// discarded because a newer load had been issued.
    ///
    /// The load runs on its own task, so dropping the returned future does not
    /// abandon the token it issued: the fetch still completes and applies.
    pub async fn load(&self) -> ConsoleResult<bool> {
        let inner = Arc::clone(&self.inner);
        let collection = inner.collection;
        tokio::spawn(async move { inner.load().await })
            .await
            .map_err(|e| ConsoleError::transient(collection, format!("load task ended: {}", e)))?
    }

    /// Subscribes to the collection's change channel and issues the initial
    /// load. Calling it while already watching is a no-op.
    pub async fn start_watching(&mut self) -> ConsoleResult<()> {
        if self.watch.is_some() || self.inner.torn_down.load(Ordering::SeqCst) {
            return Ok(());
        }
        let subscription = self.inner.store.subscribe(self.inner.collection).await?;
        let handle = subscription.handle;
        let task = tokio::spawn(watch_changes(Arc::clone(&self.inner), subscription.events));
        tracing::info!("[LISTING] Watching {} ({})", self.inner.collection, handle);

        self.watch = Some(ListingWatch {
            store: Arc::clone(&self.inner.store),
            handle,
            task,
        });
        Ok(())
    }

    pub fn stop_watching(&mut self) {
        if self.watch.take().is_some() {
            tracing::info!("[LISTING] Stopped watching {}", self.inner.collection);
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Unmounts the view: releases the subscription and freezes state.
    pub fn teardown(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.inner.torn_down.store(true, Ordering::SeqCst);
        self.stop_watching();
    }

    /// Applies the category filter immediately and raises `is_transitioning`
    /// for the configured interval. Must be called inside a tokio runtime.
    pub fn select_category(&self, category: impl Into<String>) {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return;
        }
        let category = category.into();
        let token = self.inner.issued_transitions.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_modify(|s| {
            s.selected_category = category;
            s.is_transitioning = true;
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.transition).await;
            inner.state.send_if_modified(|s| {
                let current = inner.issued_transitions.load(Ordering::SeqCst) == token;
                if current && s.is_transitioning && !inner.torn_down.load(Ordering::SeqCst) {
                    s.is_transitioning = false;
                    true
                } else {
                    false
                }
            });
        });
    }

    pub fn snapshot(&self) -> ListingState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListingState> {
        self.inner.state.subscribe()
    }

    pub fn visible(&self) -> Vec<Record> {
        self.inner.state.borrow().visible().into_iter().cloned().collect()
    }

    pub fn categories(&self) -> Vec<String> {
        self.inner.state.borrow().categories()
    }
}

impl Drop for LiveListing {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn watch_changes(inner: Arc<ListingInner>, mut events: mpsc::UnboundedReceiver<ChangeEvent>) {
    let mut loads = JoinSet::new();
    spawn_load(&mut loads, &inner);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::warn!("[LISTING] Change channel for {} closed", inner.collection);
                    break;
                };
                // Coalesce a burst into one reload; any load after the burst sees every write in it.
                let mut burst = 1;
                while events.try_recv().is_ok() {
                    burst += 1;
                }
                tracing::debug!(
                    "[LISTING] {:?} on {} ({} notification(s)), reloading",
                    event.kind, inner.collection, burst
                );
                spawn_load(&mut loads, &inner);
            }
            Some(_) = loads.join_next(), if !loads.is_empty() => {}
        }
    }

    while loads.join_next().await.is_some() {}
}

fn spawn_load(loads: &mut JoinSet<()>, inner: &Arc<ListingInner>) {
    let inner = Arc::clone(inner);
    loads.spawn(async move {
        // Failures are logged and recorded in state by `load` itself.
        let _ = inner.load().await;
    });
}
