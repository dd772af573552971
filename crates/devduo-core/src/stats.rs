//! Stat Aggregator: the four dashboard counters.
//!
//! Counts run concurrently and are joined before anything is published. A count
//! that fails is logged and reported as zero for that field only; the batch is
//! still applied as one snapshot.

use serde::Serialize;
use std::sync::Arc;

use crate::error::ConsoleResult;
use crate::record::Collection;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_projects: u64,
    pub total_feedback: u64,
    pub total_messages: u64,
}

pub struct StatAggregator {
    store: Arc<dyn RecordStore>,
    snapshot: DashboardStats,
}

impl StatAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            snapshot: DashboardStats::default(),
        }
    }

    /// Last applied snapshot (zeroed until the first cycle completes).
    pub fn snapshot(&self) -> DashboardStats {
        self.snapshot
    }

    /// Runs one aggregation cycle and replaces the snapshot.
    pub async fn compute_stats(&mut self) -> DashboardStats {
        let stats = self.compute().await;
        self.snapshot = stats;
        stats
    }

    /// Runs one aggregation cycle without touching the stored snapshot.
    pub async fn compute(&self) -> DashboardStats {
        let store = self.store.as_ref();
        let (users, projects, feedback, messages) = tokio::join!(
            store.count(Collection::Profiles, None),
            store.count(Collection::Projects, None),
            store.count(Collection::Testimonials, None),
            store.count(Collection::Messages, None),
        );

        DashboardStats {
            total_users: or_zero(Collection::Profiles, users),
            total_projects: or_zero(Collection::Projects, projects),
            total_feedback: or_zero(Collection::Testimonials, feedback),
            total_messages: or_zero(Collection::Messages, messages),
        }
    }
}

fn or_zero(collection: Collection, count: ConsoleResult<u64>) -> u64 {
    count.unwrap_or_else(|e| {
        tracing::warn!("[STATS] Count of {} unavailable, reporting 0: {}", collection, e);
        0
    })
}
