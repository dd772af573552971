//! Sled-backed record store.
//!
//! One tree per collection, JSON values keyed by record id. Change notifications
//! come from sled's `watch_prefix`, forwarded by one task per subscription.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ConsoleResult;
use crate::record::{ChangeEvent, ChangeKind, Collection, FieldFilter, Record, RecordQuery};
use crate::store::{RecordStore, Subscription, SubscriptionHandle};

const DEFAULT_STORE_PATH: &str = "./data/devduo_store";

pub struct SledRecordStore {
    db: sled::Db,
    next_handle: AtomicU64,
    watchers: DashMap<SubscriptionHandle, JoinHandle<()>>,
}

impl SledRecordStore {
    /// Open the store at the given path, or the default data directory.
    pub fn open(path: Option<impl AsRef<Path>>) -> ConsoleResult<Self> {
        let p = path
            .map(|x| x.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new(DEFAULT_STORE_PATH).to_path_buf());
        let db = sled::open(p)?;
        Ok(Self::with_db(db))
    }

    /// Temporary store that is deleted on drop. Used by demos and tests.
    pub fn temporary() -> ConsoleResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::with_db(db))
    }

    fn with_db(db: sled::Db) -> Self {
        Self {
            db,
            next_handle: AtomicU64::new(1),
            watchers: DashMap::new(),
        }
    }

    fn tree(&self, collection: Collection) -> ConsoleResult<sled::Tree> {
        Ok(self.db.open_tree(collection.table())?)
    }

    /// Insert or replace a record (server-side mutation).
    pub fn put(&self, collection: Collection, record: &Record) -> ConsoleResult<()> {
        let bytes = serde_json::to_vec(record)?;
        self.tree(collection)?.insert(record.id.as_bytes(), bytes)?;
        Ok(())
    }

    /// Delete a record by id. Returns whether it existed.
    pub fn remove(&self, collection: Collection, id: &str) -> ConsoleResult<bool> {
        Ok(self.tree(collection)?.remove(id.as_bytes())?.is_some())
    }

    pub fn flush(&self) -> ConsoleResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of live subscriptions (for teardown diagnostics).
    pub fn active_subscriptions(&self) -> usize {
        self.watchers.len()
    }

    fn decode_all(&self, collection: Collection) -> ConsoleResult<Vec<Record>> {
        let mut rows = Vec::new();
        for item in self.tree(collection)?.iter() {
            let (_, value) = item?;
            match serde_json::from_slice::<Record>(&value) {
                Ok(record) => rows.push(record),
                Err(e) => {
                    tracing::warn!("[STORE] Skipping undecodable row in {}: {}", collection, e);
                }
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn count(&self, collection: Collection, filter: Option<FieldFilter>) -> ConsoleResult<u64> {
        // Same rows as `query`: undecodable entries are not counted.
        let rows = self.decode_all(collection)?;
        Ok(match filter {
            None => rows.len() as u64,
            Some(f) => rows.iter().filter(|r| f.matches(r)).count() as u64,
        })
    }

    async fn query(&self, collection: Collection, query: RecordQuery) -> ConsoleResult<Vec<Record>> {
        let rows = self.decode_all(collection)?;
        Ok(query.apply(rows))
    }

    async fn subscribe(&self, collection: Collection) -> ConsoleResult<Subscription> {
        let tree = self.tree(collection)?;
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscriber = tree.watch_prefix(Vec::<u8>::new());
        let task = tokio::spawn(async move {
            while let Some(event) = (&mut subscriber).await {
                let (kind, key) = match event {
                    sled::Event::Insert { key, .. } => (ChangeKind::Upsert, key),
                    sled::Event::Remove { key } => (ChangeKind::Remove, key),
                };
                let change = ChangeEvent {
                    collection,
                    kind,
                    record_id: String::from_utf8(key.to_vec()).ok(),
                };
                if tx.send(change).is_err() {
                    break;
                }
            }
        });
        self.watchers.insert(handle, task);
        tracing::debug!("[STORE] {} opened on {}", handle, collection);

        Ok(Subscription { handle, events: rx })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some((_, task)) = self.watchers.remove(&handle) {
            task.abort();
            tracing::debug!("[STORE] {} released", handle);
        }
    }
}

impl Drop for SledRecordStore {
    fn drop(&mut self) {
        for entry in self.watchers.iter() {
            entry.value().abort();
        }
    }
}
