//! Scripted in-memory store for ordering and failure control.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use devduo_core::{
    ChangeEvent, ChangeKind, Collection, ConsoleError, ConsoleResult, FieldFilter, Record, RecordQuery,
    RecordStore, Subscription, SubscriptionHandle,
};

#[derive(Default)]
pub struct ScriptedStore {
    rows: Mutex<HashMap<Collection, Vec<Record>>>,
    failing: Mutex<HashSet<Collection>>,
    held: Mutex<HashMap<Collection, VecDeque<oneshot::Receiver<()>>>>,
    subscribers: Mutex<HashMap<SubscriptionHandle, (Collection, mpsc::UnboundedSender<ChangeEvent>)>>,
    next_handle: AtomicU64,
    queries: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, collection: Collection, rows: Vec<Record>) {
        self.rows.lock().unwrap().insert(collection, rows);
    }

    pub fn rows(&self, collection: Collection) -> Vec<Record> {
        self.rows.lock().unwrap().get(&collection).cloned().unwrap_or_default()
    }

    pub fn fail(&self, collection: Collection) {
        self.failing.lock().unwrap().insert(collection);
    }

    pub fn recover(&self, collection: Collection) {
        self.failing.lock().unwrap().remove(&collection);
    }

    /// The next query on `collection` snapshots its rows immediately but does
    /// not return until the returned sender fires (or is dropped).
    pub fn hold_next_query(&self, collection: Collection) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.held
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Delivers `n` change notifications to every subscriber of `collection`.
    pub fn notify(&self, collection: Collection, n: usize) {
        let subscribers = self.subscribers.lock().unwrap();
        for (c, tx) in subscribers.values() {
            if *c != collection {
                continue;
            }
            for _ in 0..n {
                let _ = tx.send(ChangeEvent {
                    collection,
                    kind: ChangeKind::Upsert,
                    record_id: None,
                });
            }
        }
    }

    fn check(&self, collection: Collection) -> ConsoleResult<()> {
        if self.failing.lock().unwrap().contains(&collection) {
            return Err(ConsoleError::transient(collection, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn count(&self, collection: Collection, filter: Option<FieldFilter>) -> ConsoleResult<u64> {
        self.check(collection)?;
        let rows = self.rows(collection);
        Ok(match filter {
            Some(f) => rows.iter().filter(|r| f.matches(r)).count() as u64,
            None => rows.len() as u64,
        })
    }

    async fn query(&self, collection: Collection, query: RecordQuery) -> ConsoleResult<Vec<Record>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.check(collection).map(|_| self.rows(collection));
        let gate = self
            .held
            .lock()
            .unwrap()
            .get_mut(&collection)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(query.apply(snapshot?))
    }

    async fn subscribe(&self, collection: Collection) -> ConsoleResult<Subscription> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, events) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().insert(handle, (collection, tx));
        Ok(Subscription { handle, events })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.lock().unwrap().remove(&handle);
    }
}

pub fn project(id: &str, category: Option<&str>, minutes_ago: i64) -> Record {
    let record = Record::new(id)
        .with_field("title", id)
        .created(chrono::Utc::now() - chrono::Duration::minutes(minutes_ago));
    match category {
        Some(c) => record.with_category(c),
        None => record,
    }
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Waits until the watched value satisfies `pred`, failing the test after two seconds.
pub async fn settle<T, F>(rx: &mut watch::Receiver<T>, pred: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
    (*value).clone()
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition never held");
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
