//! Activity Merger: the dashboard's "recent activity" feed.
//!
//! Pulls the newest rows from projects, testimonials and contact messages,
//! projects each into an [`ActivityEvent`], merges them and orders by the
//! source timestamp. Relative labels ("5 minutes ago") are computed only for
//! display and never used for ordering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::record::{Collection, Record, RecordQuery};
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Project,
    Feedback,
    Message,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 3] = [
        ActivityKind::Project,
        ActivityKind::Feedback,
        ActivityKind::Message,
    ];

    pub fn collection(&self) -> Collection {
        match self {
            ActivityKind::Project => Collection::Projects,
            ActivityKind::Feedback => Collection::Testimonials,
            ActivityKind::Message => Collection::Messages,
        }
    }

    /// Source-specific label template.
    pub fn describe(&self, record: &Record) -> String {
        match self {
            ActivityKind::Project => {
                format!("Project \"{}\" was added", record.text("title").unwrap_or("Untitled"))
            }
            ActivityKind::Feedback => format!(
                "New feedback from {}",
                record
                    .text("client_name")
                    .or_else(|| record.text("client_name_sanitized"))
                    .unwrap_or("Anonymous")
            ),
            ActivityKind::Message => {
                format!("New message from {}", record.text("name").unwrap_or("Anonymous"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEvent {
    pub action: String,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub kind: ActivityKind,
}

impl ActivityEvent {
    pub fn from_record(kind: ActivityKind, record: &Record) -> Self {
        Self {
            action: kind.describe(record),
            source_timestamp: record.created_at,
            kind,
        }
    }

    pub fn time_label(&self, now: DateTime<Utc>) -> String {
        relative_time_label(self.source_timestamp, now)
    }

    pub fn line(&self, now: DateTime<Utc>) -> ActivityLine {
        ActivityLine {
            action: self.action.clone(),
            time: self.time_label(now),
            kind: self.kind,
        }
    }
}

/// Display row for the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityLine {
    pub action: String,
    pub time: String,
    pub kind: ActivityKind,
}

/// Human-relative age of `timestamp`. Floor division, no pluralization fix-up.
pub fn relative_time_label(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = timestamp else {
        return "Unknown".to_string();
    };
    let minutes = (now - ts).num_minutes();
    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{} minutes ago", minutes)
    } else if minutes < 1440 {
        format!("{} hours ago", minutes / 60)
    } else {
        format!("{} days ago", minutes / 1440)
    }
}

/// Concatenates per-source batches, orders newest first (untimestamped last,
/// ties keep source order) and truncates.
pub fn merge_events(batches: Vec<Vec<ActivityEvent>>, limit_total: usize) -> Vec<ActivityEvent> {
    let mut events: Vec<ActivityEvent> = batches.into_iter().flatten().collect();
    events.sort_by(|a, b| b.source_timestamp.cmp(&a.source_timestamp));
    events.truncate(limit_total);
    events
}

pub struct ActivityMerger {
    store: Arc<dyn RecordStore>,
}

impl ActivityMerger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn compute_recent_activity(
        &self,
        limit_per_source: usize,
        limit_total: usize,
    ) -> Vec<ActivityEvent> {
        let (projects, feedback, messages) = tokio::join!(
            self.recent(ActivityKind::Project, limit_per_source),
            self.recent(ActivityKind::Feedback, limit_per_source),
            self.recent(ActivityKind::Message, limit_per_source),
        );
        merge_events(vec![projects, feedback, messages], limit_total)
    }

    async fn recent(&self, kind: ActivityKind, limit: usize) -> Vec<ActivityEvent> {
        let query = RecordQuery::newest_first().limit(limit);
        match self.store.query(kind.collection(), query).await {
            Ok(rows) => rows
                .iter()
                .map(|r| ActivityEvent::from_record(kind, r))
                .collect(),
            Err(e) => {
                tracing::warn!("[ACTIVITY] Skipping {} this cycle: {}", kind.collection(), e);
                Vec::new()
            }
        }
    }
}
