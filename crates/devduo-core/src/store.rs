//! Record Store Client seam.
//!
//! The console only needs four primitives from the remote store: count, query,
//! subscribe and unsubscribe. Everything that talks to the store takes an
//! `Arc<dyn RecordStore>` so tests can swap in a scripted fake.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::ConsoleResult;
use crate::record::{ChangeEvent, Collection, FieldFilter, Record, RecordQuery};

/// Opaque handle naming one live change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A live change subscription. Notifications are delivered at least once and
/// may arrive at any point relative to in-flight queries.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Remote collection store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of rows in `collection` matching `filter`.
    async fn count(&self, collection: Collection, filter: Option<FieldFilter>) -> ConsoleResult<u64>;

    /// Ordered rows of `collection`.
    async fn query(&self, collection: Collection, query: RecordQuery) -> ConsoleResult<Vec<Record>>;

    /// Opens a change channel for `collection`.
    async fn subscribe(&self, collection: Collection) -> ConsoleResult<Subscription>;

    /// Releases a subscription. Unknown handles are ignored. Must not block, it
    /// is called from `Drop`.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
